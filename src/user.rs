use log::error;
use serde::Deserialize;
use serde_json::Value;

use crate::game::ClaimOutcome;
use crate::http_client::{ApiClient, ApiDomain, RequestOptions};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub username: Option<String>,
}

pub async fn me(api: &mut ApiClient) -> Option<Profile> {
    let value = api
        .get("/api/v1/user/me", RequestOptions::new(ApiDomain::User))
        .await?;
    match serde_json::from_value(value) {
        Ok(profile) => Some(profile),
        Err(e) => {
            error!("{}: malformed profile response: {}", api.account(), e);
            None
        }
    }
}

pub async fn friends_balance(api: &mut ApiClient) -> Option<Value> {
    api.get(
        "/api/v1/friends/balance",
        RequestOptions::new(ApiDomain::User),
    )
    .await
}

pub async fn claim_friend_reward(api: &mut ApiClient) -> Option<ClaimOutcome> {
    let value = api
        .post("/api/v1/friends/claim", RequestOptions::new(ApiDomain::User))
        .await?;
    if value.is_null() {
        return Some(ClaimOutcome::default());
    }
    serde_json::from_value(value).ok()
}
