use log::error;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::http_client::{ApiClient, ApiDomain, RequestOptions};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub play_passes: i64,
    pub available_balance: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReward {
    #[serde(default)]
    pub can_claim: bool,
    #[serde(default)]
    pub next_claim_time: Option<Value>,
}

/// Reward amount reported by a claim endpoint. Some deployments answer a
/// claim with an empty body; that decodes to a zero amount.
#[derive(Debug, Default, Deserialize)]
pub struct ClaimOutcome {
    #[serde(default)]
    pub amount: f64,
}

/// Farming timer state, decoded once here. An absent claim-status body means
/// no cycle is running; a transport failure looks the same to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum FarmingStatus {
    NotRunning,
    Running {
        can_claim: bool,
        end_time: Option<Value>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmingCycle {
    #[serde(default)]
    pub end_time: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelState {
    #[serde(default)]
    pub can_spin: bool,
    #[serde(default)]
    pub spins_left: i64,
    #[serde(default)]
    pub next_spin_time: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelPrize {
    #[serde(default)]
    pub prize: Option<String>,
    #[serde(default)]
    pub amount: f64,
}

fn decode<T: DeserializeOwned + Default>(account: &str, what: &str, value: Value) -> Option<T> {
    if value.is_null() {
        return Some(T::default());
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            error!("{}: malformed {} response: {}", account, what, e);
            None
        }
    }
}

pub async fn server_now(api: &mut ApiClient) -> Option<Value> {
    let value = api
        .get("/api/v1/time/now", RequestOptions::new(ApiDomain::Game))
        .await?;
    value.get("now").cloned()
}

pub async fn balance(api: &mut ApiClient) -> Option<Balance> {
    let value = api
        .get("/api/v1/user/balance", RequestOptions::new(ApiDomain::Game))
        .await?;
    // A body without both fields counts as a failed call.
    match serde_json::from_value(value) {
        Ok(balance) => Some(balance),
        Err(e) => {
            error!("{}: malformed balance response: {}", api.account(), e);
            None
        }
    }
}

pub async fn daily_reward(api: &mut ApiClient) -> Option<DailyReward> {
    let value = api
        .get("/api/v2/daily-reward", RequestOptions::new(ApiDomain::Game))
        .await?;
    decode(api.account(), "daily reward", value)
}

pub async fn claim_daily_reward(api: &mut ApiClient) -> Option<ClaimOutcome> {
    let value = api
        .post("/api/v2/daily-reward", RequestOptions::new(ApiDomain::Game))
        .await?;
    decode(api.account(), "daily reward claim", value)
}

pub async fn farming_status(api: &mut ApiClient) -> FarmingStatus {
    let value = match api
        .get(
            "/api/v1/farming/claim",
            RequestOptions::new(ApiDomain::Game).quiet(),
        )
        .await
    {
        Some(value) if !value.is_null() => value,
        _ => return FarmingStatus::NotRunning,
    };
    FarmingStatus::Running {
        can_claim: value
            .get("canClaim")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        end_time: value.get("endTime").cloned(),
    }
}

pub async fn start_farming(api: &mut ApiClient) -> Option<FarmingCycle> {
    let value = api
        .post("/api/v1/farming/start", RequestOptions::new(ApiDomain::Game))
        .await?;
    decode(api.account(), "farming start", value)
}

pub async fn claim_farming(api: &mut ApiClient) -> Option<ClaimOutcome> {
    let value = api
        .post("/api/v1/farming/claim", RequestOptions::new(ApiDomain::Game))
        .await?;
    decode(api.account(), "farming claim", value)
}

pub async fn wheel_state(api: &mut ApiClient) -> Option<WheelState> {
    let value = api
        .get(
            "/api/v1/wheel",
            RequestOptions::new(ApiDomain::Game).quiet(),
        )
        .await?;
    decode(api.account(), "wheel state", value)
}

pub async fn spin_wheel(api: &mut ApiClient) -> Option<WheelPrize> {
    let value = api
        .post(
            "/api/v1/wheel/spin",
            RequestOptions::new(ApiDomain::Game),
        )
        .await?;
    decode(api.account(), "wheel spin", value)
}
