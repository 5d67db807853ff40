use serde::Deserialize;
use serde_json::Value;

use crate::http_client::{ApiClient, ApiDomain, RequestOptions};

/// Tribe queries run in suppressed-error mode throughout: "not in a tribe"
/// comes back as an absent resource and is an ordinary answer, not a fault.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TribeInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chatname: Option<String>,
    #[serde(default)]
    pub rank: Option<i64>,
}

fn quiet() -> RequestOptions {
    RequestOptions::new(ApiDomain::Tribe).quiet()
}

fn decode_tribe(value: Value) -> Option<TribeInfo> {
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value).ok()
}

pub async fn my_tribe(api: &mut ApiClient) -> Option<TribeInfo> {
    let value = api.get("/api/v1/tribe/my", quiet()).await?;
    decode_tribe(value)
}

pub async fn overview(api: &mut ApiClient) -> Option<Value> {
    api.get("/api/v1/tribe", quiet()).await
}

pub async fn leaderboard(api: &mut ApiClient) -> Option<Value> {
    api.get("/api/v1/tribe/leaderboard", quiet()).await
}

pub async fn tribe_bot(api: &mut ApiClient) -> Option<Value> {
    api.get("/api/v1/tribe/bot", quiet()).await
}

pub async fn by_chatname(api: &mut ApiClient, chatname: &str) -> Option<TribeInfo> {
    if chatname.is_empty() {
        return None;
    }
    let value = api
        .get(&format!("/api/v1/tribe/by-chatname/{}", chatname), quiet())
        .await?;
    decode_tribe(value)
}

pub async fn join(api: &mut ApiClient, chatname: &str) -> bool {
    if chatname.is_empty() {
        return false;
    }
    api.post(&format!("/api/v1/tribe/{}/join", chatname), quiet())
        .await
        .is_some()
}

pub async fn leave(api: &mut ApiClient) -> bool {
    api.delete("/api/v1/tribe/leave", quiet()).await.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;
    use crate::token_store::TokenStore;
    use reqwest::Method;

    fn client(fake: &FakeTransport) -> (tempfile::TempDir, ApiClient) {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path().join("tokens.json")).unwrap();
        let api = ApiClient::new(
            Box::new(fake.clone()),
            store,
            "tester",
            "https://game.example.com",
            None,
        );
        (dir, api)
    }

    #[tokio::test]
    async fn absent_tribe_is_not_an_error() {
        let fake = FakeTransport::new();
        // Unrouted: the fake answers 404, which maps to "no tribe".
        let (_dir, mut api) = client(&fake);
        assert!(my_tribe(&mut api).await.is_none());
    }

    #[tokio::test]
    async fn membership_is_decoded() {
        let fake = FakeTransport::new();
        fake.on(
            Method::GET,
            "/api/v1/tribe/my",
            vec![(200, r#"{"title":"The Drop","chatname":"thedrop","rank":3}"#)],
        );
        let (_dir, mut api) = client(&fake);
        let tribe = my_tribe(&mut api).await.unwrap();
        assert_eq!(tribe.title.as_deref(), Some("The Drop"));
        assert_eq!(tribe.rank, Some(3));
    }

    #[tokio::test]
    async fn empty_chatname_short_circuits() {
        let fake = FakeTransport::new();
        let (_dir, mut api) = client(&fake);
        assert!(by_chatname(&mut api, "").await.is_none());
        assert!(!join(&mut api, "").await);
        assert!(fake.calls().is_empty());
    }
}
