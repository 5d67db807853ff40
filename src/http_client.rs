use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE,
    ORIGIN, REFERER, USER_AGENT,
};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::token_store::TokenStore;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Mobile Safari/537.36";
pub const DEFAULT_RETRIES: u32 = 3;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_PAUSE: Duration = Duration::from_secs(1);
const REFRESH_PATH: &str = "/api/v1/auth/refresh";

static BASE_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ORIGIN, HeaderValue::from_static("https://webapp.game.dropee.xyz"));
    headers.insert(REFERER, HeaderValue::from_static("https://webapp.game.dropee.xyz/"));
    headers.insert(HeaderName::from_static("priority"), HeaderValue::from_static("u=1, i"));
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static("\"Chromium\";v=\"128\", \"Not;A=Brand\";v=\"24\", \"Google Chrome\";v=\"128\""),
    );
    headers.insert(HeaderName::from_static("sec-ch-ua-mobile"), HeaderValue::from_static("?1"));
    headers.insert(HeaderName::from_static("sec-ch-ua-platform"), HeaderValue::from_static("\"Android\""));
    headers.insert(HeaderName::from_static("sec-fetch-dest"), HeaderValue::from_static("empty"));
    headers.insert(HeaderName::from_static("sec-fetch-mode"), HeaderValue::from_static("cors"));
    headers.insert(HeaderName::from_static("sec-fetch-site"), HeaderValue::from_static("cross-site"));
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("org.telegram.messenger"),
    );
    headers
});

/// Logical endpoint grouping. All domains currently resolve to one physical
/// host, but callers name the domain they mean so a future split stays a
/// one-line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiDomain {
    Game,
    User,
    Earn,
    Tribe,
}

#[derive(Debug)]
pub enum TransportError {
    Http(reqwest::Error),
    ConnectionFailed(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Http(e) => write!(f, "HTTP request error: {}", e),
            TransportError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err)
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// The wire seam. Production uses reqwest; tests script responses.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<RawResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(proxy: Option<&str>) -> Result<ReqwestTransport, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(CALL_TIMEOUT);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(ReqwestTransport {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<RawResponse, TransportError> {
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// Per-call knobs, mirroring what individual endpoints need: which logical
/// domain, whether to attach the bearer header, how loudly to fail.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub domain: ApiDomain,
    pub body: Option<Value>,
    pub expect_status: StatusCode,
    pub auth_header: bool,
    pub retries: Option<u32>,
    pub display_errors: bool,
}

impl RequestOptions {
    pub fn new(domain: ApiDomain) -> RequestOptions {
        RequestOptions {
            domain,
            body: None,
            expect_status: StatusCode::OK,
            auth_header: true,
            retries: None,
            display_errors: true,
        }
    }

    pub fn body(mut self, body: Value) -> RequestOptions {
        self.body = Some(body);
        self
    }

    pub fn no_auth(mut self) -> RequestOptions {
        self.auth_header = false;
        self
    }

    /// Suppresses error logging for endpoints where absence is expected
    /// ("not in a tribe", farming not started).
    pub fn quiet(mut self) -> RequestOptions {
        self.display_errors = false;
        self
    }

    pub fn retries(mut self, retries: u32) -> RequestOptions {
        self.retries = Some(retries);
        self
    }
}

/// Authenticated transport for one account: spoofed browser identity, bearer
/// injection, bounded retries, and a single-shot refresh-and-replay on 401.
///
/// Remote failures never surface as errors. Every call resolves to
/// `Some(json)` or `None`; callers branch on content.
pub struct ApiClient {
    transport: Box<dyn HttpTransport>,
    store: TokenStore,
    account: String,
    base_url: String,
    user_agent: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_refreshed: bool,
    retries: u32,
}

impl ApiClient {
    pub fn new(
        transport: Box<dyn HttpTransport>,
        store: TokenStore,
        account: &str,
        base_url: &str,
        user_agent: Option<&str>,
    ) -> ApiClient {
        let user_agent = user_agent.unwrap_or(DEFAULT_USER_AGENT).to_string();
        if user_agent.to_lowercase().contains("windows") {
            warn!(
                "{}: desktop user agent configured, a mobile one draws less attention",
                account
            );
        }
        ApiClient {
            transport,
            store,
            account: account.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent,
            access_token: None,
            refresh_token: None,
            token_refreshed: false,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Overrides the per-call retry budget (`max_retries` in the config).
    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries;
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn set_tokens(&mut self, access: Option<String>, refresh: Option<String>) {
        self.access_token = access;
        self.refresh_token = refresh;
    }

    pub fn clear_access_token(&mut self) {
        self.access_token = None;
    }

    pub fn persist_tokens(&self) {
        if let Err(e) = self.store.save(
            &self.account,
            self.access_token.as_deref(),
            self.refresh_token.as_deref(),
        ) {
            warn!("{}: failed to persist tokens: {}", self.account, e);
        }
    }

    pub async fn get(&mut self, path: &str, options: RequestOptions) -> Option<Value> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post(&mut self, path: &str, options: RequestOptions) -> Option<Value> {
        self.request(Method::POST, path, options).await
    }

    pub async fn delete(&mut self, path: &str, options: RequestOptions) -> Option<Value> {
        self.request(Method::DELETE, path, options).await
    }

    fn base_url(&self, _domain: ApiDomain) -> &str {
        // Every logical domain shares one physical host today.
        &self.base_url
    }

    fn resolve_url(&self, path: &str, domain: ApiDomain) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url(domain), path)
        }
    }

    fn build_headers(&self, url: &str, auth: bool) -> HeaderMap {
        // Browser-identity headers only go to the game host, never to
        // arbitrary absolute URLs a caller may pass through.
        let mut headers = if url.starts_with(&self.base_url) {
            BASE_HEADERS.clone()
        } else {
            HeaderMap::new()
        };
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        if auth {
            if let Some(token) = &self.access_token {
                if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
        }
        headers
    }

    /// One bounded loop covers the whole chain: transient retries and the
    /// 401 refresh-replay all consume the same budget, so a persistently
    /// failing endpoint terminates after at most `retries + 1` attempts.
    async fn request(&mut self, method: Method, path: &str, options: RequestOptions) -> Option<Value> {
        let url = self.resolve_url(path, options.domain);
        let body = options.body.as_ref().map(Value::to_string);
        let mut budget = options.retries.unwrap_or(self.retries);
        loop {
            let headers = self.build_headers(&url, options.auth_header);
            match self
                .transport
                .execute(method.clone(), &url, headers, body.clone())
                .await
            {
                Ok(response)
                    if response.status == StatusCode::UNAUTHORIZED && options.auth_header =>
                {
                    if !self.renew_access_token().await {
                        return None;
                    }
                    if budget == 0 {
                        if options.display_errors {
                            error!("{}: retry budget exhausted for {}", self.account, url);
                        }
                        return None;
                    }
                    budget -= 1;
                    info!("{}: access token renewed, replaying {}", self.account, url);
                }
                Ok(response) if response.status != options.expect_status => {
                    if options.display_errors {
                        error!(
                            "{}: {} {} returned {}: {}",
                            self.account,
                            method,
                            url,
                            response.status,
                            snippet(&response.body)
                        );
                    }
                    return None;
                }
                Ok(response) => {
                    if response.body.trim().is_empty() {
                        return Some(Value::Null);
                    }
                    return match serde_json::from_str(&response.body) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            if options.display_errors {
                                error!("{}: invalid JSON from {}: {}", self.account, url, e);
                            }
                            None
                        }
                    };
                }
                Err(e) => {
                    if options.display_errors {
                        warn!("{}: {} {} failed: {}", self.account, method, url, e);
                    }
                    if budget == 0 {
                        return None;
                    }
                    budget -= 1;
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
            }
        }
    }

    /// Exchanges the refresh token for a new pair. Honored at most once per
    /// process lifetime of this client; a second attempt, or any failure,
    /// deletes the stored credential so the next scan logs in from scratch.
    async fn renew_access_token(&mut self) -> bool {
        if self.token_refreshed {
            self.store.delete_logged(&self.account);
            return false;
        }
        let refresh = match self.refresh_token.clone() {
            Some(refresh) => refresh,
            None => {
                self.store.delete_logged(&self.account);
                return false;
            }
        };

        let url = self.resolve_url(REFRESH_PATH, ApiDomain::User);
        let headers = self.build_headers(&url, false);
        let body = serde_json::json!({ "refresh": refresh }).to_string();
        let response = match self
            .transport
            .execute(Method::POST, &url, headers, Some(body))
            .await
        {
            Ok(response) if response.status == StatusCode::OK => response,
            _ => {
                self.store.delete_logged(&self.account);
                return false;
            }
        };

        let parsed: Value = match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(_) => {
                self.store.delete_logged(&self.account);
                return false;
            }
        };
        let access = match parsed.get("access").and_then(Value::as_str) {
            Some(access) if !access.is_empty() => access.to_string(),
            _ => {
                self.store.delete_logged(&self.account);
                return false;
            }
        };

        self.refresh_token = parsed
            .get("refresh")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.access_token = Some(access);
        self.token_refreshed = true;
        // Persist before the replay so a restart can pick the new pair up.
        self.persist_tokens();
        true
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let mut cut: String = body.chars().take(MAX).collect();
        cut.push_str("...");
        cut
    }
}
