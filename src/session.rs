use chrono::{Duration, Local, Utc};
use log::{error, info};
use serde_json::{json, Value};

use crate::http_client::{ApiClient, ApiDomain, RequestOptions};

const LOGIN_PATH: &str = "/api/v1/auth/telegram";

/// Minutes west of UTC, matching what the game's web client submits.
pub fn tz_offset_minutes() -> i64 {
    -(Local::now().offset().local_minus_utc() as i64) / 60
}

/// Seeds the client with the cached credential for its account. An access
/// token older than `max_age_hours` is dropped (the refresh token is kept)
/// so the run logs in fresh instead of burning a call on a guaranteed 401.
pub fn hydrate(api: &mut ApiClient, max_age_hours: i64) {
    let credential = match api.store().load(api.account()) {
        Some(credential) => credential,
        None => return,
    };
    let stale = Utc::now() - credential.last_update > Duration::hours(max_age_hours);
    if stale {
        info!(
            "{}: cached access token is stale, logging in again",
            api.account()
        );
        api.set_tokens(None, credential.refresh_token);
    } else {
        api.set_tokens(credential.access_token, credential.refresh_token);
    }
}

/// Exchanges the opaque Telegram login payload for a token pair. Called
/// without a bearer header; success requires both tokens in the response.
pub async fn login(api: &mut ApiClient, telegram_data: &str) -> bool {
    let body = json!({
        "telegram_data": telegram_data,
        "tz_offset": tz_offset_minutes(),
    });
    let options = RequestOptions::new(ApiDomain::Game).no_auth().body(body);
    let response = match api.post(LOGIN_PATH, options).await {
        Some(response) => response,
        None => {
            error!("{}: login exchange failed", api.account());
            return false;
        }
    };

    let token = &response["token"];
    let access = token.get("access").and_then(Value::as_str).unwrap_or("");
    let refresh = token.get("refresh").and_then(Value::as_str).unwrap_or("");
    if access.is_empty() || refresh.is_empty() {
        error!("{}: login response missing token pair", api.account());
        return false;
    }

    api.set_tokens(Some(access.to_string()), Some(refresh.to_string()));
    api.persist_tokens();
    info!("{}: logged in", api.account());
    true
}

pub async fn ensure_authenticated(api: &mut ApiClient, telegram_data: &str) -> bool {
    if api.has_access_token() {
        return true;
    }
    login(api, telegram_data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;
    use crate::token_store::{Credential, TokenStore};
    use reqwest::Method;

    fn setup(fake: &FakeTransport) -> (tempfile::TempDir, TokenStore, ApiClient) {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path().join("tokens.json")).unwrap();
        let api = ApiClient::new(
            Box::new(fake.clone()),
            store.clone(),
            "tester",
            "https://game.example.com",
            None,
        );
        (dir, store, api)
    }

    #[tokio::test]
    async fn login_stores_the_token_pair() {
        let fake = FakeTransport::new();
        fake.on(
            Method::POST,
            "/api/v1/auth/telegram",
            vec![(200, r#"{"token":{"access":"a1","refresh":"r1"}}"#)],
        );
        let (_dir, store, mut api) = setup(&fake);

        assert!(login(&mut api, "query_id=abc").await);
        assert!(api.has_access_token());
        let cred = store.load("tester").unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("a1"));
        assert_eq!(cred.refresh_token.as_deref(), Some("r1"));

        // The exchange carries the raw payload and a tz offset, no bearer.
        let call = &fake.calls()[0];
        assert!(call.authorization.is_none());
        let body: serde_json::Value = serde_json::from_str(call.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["telegram_data"], "query_id=abc");
        assert!(body["tz_offset"].is_i64());
    }

    #[tokio::test]
    async fn login_rejects_partial_token_object() {
        let fake = FakeTransport::new();
        fake.on(
            Method::POST,
            "/api/v1/auth/telegram",
            vec![(200, r#"{"token":{"access":"a1"}}"#)],
        );
        let (_dir, store, mut api) = setup(&fake);

        assert!(!login(&mut api, "query_id=abc").await);
        assert!(!api.has_access_token());
        assert!(store.load("tester").is_none());
    }

    #[tokio::test]
    async fn hydrate_uses_fresh_cached_tokens() {
        let fake = FakeTransport::new();
        let (_dir, store, mut api) = setup(&fake);
        store.save("tester", Some("a1"), Some("r1")).unwrap();

        hydrate(&mut api, 6);
        assert!(api.has_access_token());
        assert!(ensure_authenticated(&mut api, "unused").await);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn hydrate_drops_stale_access_token() {
        let fake = FakeTransport::new();
        let (_dir, store, mut api) = setup(&fake);
        store.insert_raw(
            "tester",
            Credential {
                access_token: Some("a1".into()),
                refresh_token: Some("r1".into()),
                last_update: Utc::now() - Duration::hours(7),
            },
        );

        hydrate(&mut api, 6);
        assert!(!api.has_access_token());
    }
}
