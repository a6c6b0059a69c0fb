use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::{self, USER_DETAILS_TAG},
    logger::{sanitize_body, DiscardLogger, Logger},
    RequestBody, Result, RetryPolicy, WallarmError,
};

/// Default Wallarm Cloud API host.
pub const DEFAULT_API_URL: &str = "https://api.wallarm.com";

const UUID_HEADER: &str = "x-wallarmapi-uuid";
const SECRET_HEADER: &str = "x-wallarmapi-secret";

/// Immutable configuration shared by every clone of a [`WallarmClient`].
struct ClientConfig {
    base_url: String,
    headers: HeaderMap,
    user_agent: Option<HeaderValue>,
    retry_policy: RetryPolicy,
    logger: Arc<dyn Logger>,
    timeout: Option<Duration>,
}

/// Builder for [`WallarmClient`]. Settings are validated in [`ClientBuilder::build`].
pub struct ClientBuilder {
    base_url: String,
    headers: HeaderMap,
    user_agent: Option<String>,
    retry: RetrySetting,
    logger: Arc<dyn Logger>,
    http: Option<reqwest::Client>,
    timeout: Option<Duration>,
    error: Option<WallarmError>,
}

enum RetrySetting {
    Policy(RetryPolicy),
    Secs { max_retries: u32, min: u64, max: u64 },
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_owned(),
            headers: HeaderMap::new(),
            user_agent: None,
            retry: RetrySetting::Policy(RetryPolicy::default()),
            logger: Arc::new(DiscardLogger),
            http: None,
            timeout: None,
            error: None,
        }
    }
}

impl ClientBuilder {
    /// API host, e.g. `https://us1.api.wallarm.com`. Paths are appended to it.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replaces the static headers sent with every request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Appends one static header value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => self.fail(format!("invalid header {name:?}")),
        }
        self
    }

    /// Sets the API credential headers.
    pub fn credentials(mut self, uuid: &str, secret: &str) -> Self {
        if uuid.trim().is_empty() || secret.trim().is_empty() {
            self.fail("credentials are not set: specify UUID and secret".to_owned());
            return self;
        }
        match (HeaderValue::from_str(uuid.trim()), HeaderValue::from_str(secret.trim())) {
            (Ok(uuid), Ok(mut secret)) => {
                secret.set_sensitive(true);
                self.headers.insert(HeaderName::from_static(UUID_HEADER), uuid);
                self.headers.insert(HeaderName::from_static(SECRET_HEADER), secret);
            }
            _ => self.fail("credentials contain invalid header characters".to_owned()),
        }
        self
    }

    /// Overrides the `User-Agent` header of every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Retry count and backoff bounds. Defaults to [`RetryPolicy::default`].
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetrySetting::Policy(policy);
        self
    }

    /// Retry policy with delays in whole seconds, checked at build time.
    pub fn retry(mut self, max_retries: u32, min_retry_delay_secs: u64, max_retry_delay_secs: u64) -> Self {
        self.retry = RetrySetting::Secs {
            max_retries,
            min: min_retry_delay_secs,
            max: max_retry_delay_secs,
        };
        self
    }

    /// Sink for retry diagnostics. By default nothing is logged.
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Custom HTTP client, e.g. one configured with a proxy.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Timeout applied to each physical attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(WallarmError::Config(message));
        }
    }

    /// Validates the settings and creates the client.
    ///
    /// Fails with [`WallarmError::Config`] on invalid headers, credentials,
    /// base URL or retry bounds.
    pub fn build(self) -> Result<WallarmClient> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let base_url = self.base_url.trim().trim_end_matches('/').to_owned();
        Url::parse(&base_url)
            .map_err(|err| WallarmError::Config(format!("invalid base URL {base_url:?}: {err}")))?;

        let retry_policy = match self.retry {
            RetrySetting::Policy(policy) => policy,
            RetrySetting::Secs {
                max_retries,
                min,
                max,
            } => RetryPolicy::from_secs(max_retries, min, max)?,
        };

        let user_agent = self
            .user_agent
            .map(|agent| {
                HeaderValue::from_str(&agent)
                    .map_err(|_| WallarmError::Config(format!("invalid user agent {agent:?}")))
            })
            .transpose()?;

        Ok(WallarmClient {
            http: self.http.unwrap_or_default(),
            config: Arc::new(ClientConfig {
                base_url,
                headers: self.headers,
                user_agent,
                retry_policy,
                logger: self.logger,
                timeout: self.timeout,
            }),
        })
    }
}

#[derive(Clone)]
/// HTTP client for the Wallarm Cloud API.
pub struct WallarmClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl fmt::Debug for WallarmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .config
            .headers
            .iter()
            .map(|(name, value)| {
                let shown = if value.is_sensitive() || name.as_str() == SECRET_HEADER {
                    "<redacted>"
                } else {
                    value.to_str().unwrap_or("<binary>")
                };
                (name.as_str(), shown)
            })
            .collect();
        f.debug_struct("WallarmClient")
            .field("base_url", &self.config.base_url)
            .field("headers", &headers)
            .field("user_agent", &self.config.user_agent)
            .field("retry_policy", &self.config.retry_policy)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

impl WallarmClient {
    /// Starts a [`ClientBuilder`] targeting [`DEFAULT_API_URL`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Creates a client with default settings for the given API host.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `WALLARM_API_HOST` — API host, defaults to [`DEFAULT_API_URL`]
    /// - `WALLARM_API_UUID` — credential UUID
    /// - `WALLARM_API_SECRET` — credential secret
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("WALLARM_API_HOST")
            .ok()
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        let uuid = std::env::var("WALLARM_API_UUID").map_err(|_| {
            WallarmError::Config("missing WALLARM_API_UUID environment variable".to_owned())
        })?;
        let secret = std::env::var("WALLARM_API_SECRET").map_err(|_| {
            WallarmError::Config("missing WALLARM_API_SECRET environment variable".to_owned())
        })?;
        Self::builder()
            .base_url(host)
            .credentials(&uuid, &secret)
            .build()
    }

    /// API host without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Retry policy applied to every call.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry_policy
    }

    /// Performs a request and returns the raw success body.
    ///
    /// `resource_tag` names the kind of object acted on (`"node"`, `"user"`,
    /// ...) and only affects response classification. Transport failures,
    /// 429 and 5xx responses are retried per the client's [`RetryPolicy`].
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        resource_tag: &str,
        body: impl Into<RequestBody>,
    ) -> Result<Bytes> {
        self.run(method, path, resource_tag, body.into(), None).await
    }

    /// Like [`WallarmClient::execute`], aborting remaining attempts with
    /// [`WallarmError::Cancelled`] once `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        method: Method,
        path: &str,
        resource_tag: &str,
        body: impl Into<RequestBody>,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        self.run(method, path, resource_tag, body.into(), Some(cancel))
            .await
    }

    /// Performs a request and decodes the success body as JSON.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        resource_tag: &str,
        body: impl Into<RequestBody>,
    ) -> Result<T> {
        let bytes = self.execute(method, path, resource_tag, body).await?;
        serde_json::from_slice(&bytes).map_err(|err| {
            WallarmError::Decode(format!(
                "invalid response JSON: {err}; body: {}",
                String::from_utf8_lossy(&bytes)
            ))
        })
    }

    async fn run(
        &self,
        method: Method,
        path: &str,
        resource_tag: &str,
        body: RequestBody,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes> {
        let payload = body.encode();
        let max_retries = self.config.retry_policy.max_retries();
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                self.wait_before_retry(attempt, &method, path, cancel)
                    .await?;
            }

            let request = self.prepare(&method, path, resource_tag, &body, payload.clone())?;
            let response = cancellable(cancel, self.http.execute(request)).await?;
            let can_retry = attempt < max_retries;

            match response {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if classify::is_retryable_status(status) {
                        match cancellable(cancel, response.bytes()).await? {
                            Ok(bytes) => {
                                self.config.logger.log(format_args!(
                                    "Request: {method} {path} (attempt {attempt}) got an error response {status}: {}",
                                    sanitize_body(&bytes)
                                ));
                                #[cfg(feature = "tracing")]
                                tracing::warn!(%method, path, attempt, status, "retryable error response");

                                if can_retry {
                                    attempt += 1;
                                    continue;
                                }
                                return classify::classify(status, resource_tag, bytes);
                            }
                            Err(err) => {
                                self.config.logger.log(format_args!(
                                    "Request: {method} {path} (attempt {attempt}) got an error response {status}, body unreadable: {err}"
                                ));
                                if can_retry {
                                    attempt += 1;
                                    continue;
                                }
                                return Err(read_error(&method, path, err));
                            }
                        }
                    }

                    let bytes = cancellable(cancel, response.bytes())
                        .await?
                        .map_err(|err| read_error(&method, path, err))?;
                    return classify::classify(status, resource_tag, bytes);
                }
                Err(err) => {
                    self.config.logger.log(format_args!(
                        "Error performing request: {method} {path} (attempt {attempt}): {err}"
                    ));
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%method, path, attempt, error = %err, "transport error");

                    if can_retry {
                        attempt += 1;
                        continue;
                    }
                    return Err(WallarmError::Transport {
                        method: method.to_string(),
                        path: path.to_owned(),
                        attempts: attempt + 1,
                        source: err,
                    });
                }
            }
        }
    }

    /// Builds one physical request. Called once per attempt.
    fn prepare(
        &self,
        method: &Method,
        path: &str,
        resource_tag: &str,
        body: &RequestBody,
        payload: Option<Bytes>,
    ) -> Result<reqwest::Request> {
        let mut url = Url::parse(&format!("{}{}", self.config.base_url, path))
            .map_err(|err| WallarmError::InvalidUrl(format!("{path}: {err}")))?;
        if let Some(query) = body.query_string().filter(|query| !query.is_empty()) {
            url.set_query(Some(query));
        }

        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(self.request_headers(method, resource_tag));
        if let Some(payload) = payload {
            request = request.body(payload);
        }
        if let Some(timeout) = self.config.timeout {
            request = request.timeout(timeout);
        }
        request.build().map_err(WallarmError::Request)
    }

    fn request_headers(&self, method: &Method, resource_tag: &str) -> HeaderMap {
        let mut headers = self.config.headers.clone();
        if let Some(agent) = &self.config.user_agent {
            headers.insert(USER_AGENT, agent.clone());
        }

        let wants_json = matches!(*method, Method::POST | Method::PUT);
        if wants_json && !headers.contains_key(CONTENT_TYPE) && resource_tag != USER_DETAILS_TAG {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        } else if *method == Method::GET {
            headers.remove(CONTENT_TYPE);
        }
        headers
    }

    /// Sleeps the policy's backoff before attempt `attempt`.
    async fn wait_before_retry(
        &self,
        attempt: u32,
        method: &Method,
        path: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let delay = self.config.retry_policy.backoff(attempt);
        self.config.logger.log(format_args!(
            "Sleeping {delay:?} before retry attempt number {attempt} for request {method} {path}"
        ));

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying {} {} after {:?}", method, path, delay);

        cancellable(cancel, sleep(delay)).await
    }
}

/// Races `future` against the cancellation token, if any.
async fn cancellable<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Result<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(WallarmError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

fn read_error(method: &Method, path: &str, source: reqwest::Error) -> WallarmError {
    WallarmError::Read {
        method: method.to_string(),
        path: path.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
    use reqwest::Method;
    use serde_json::json;

    use super::WallarmClient;
    use crate::{RequestBody, RetryPolicy, WallarmError};

    fn client() -> WallarmClient {
        WallarmClient::builder()
            .base_url("https://api.example.test/")
            .credentials("uuid-1", "secret-token")
            .user_agent("wallarm-api-tests")
            .build()
            .expect("valid config")
    }

    fn content_type(request: &reqwest::Request) -> Option<&str> {
        request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    #[test]
    fn post_and_put_get_json_content_type() {
        let client = client();
        for method in [Method::POST, Method::PUT] {
            let body = RequestBody::json(&json!({"id": 1})).expect("json");
            let payload = body.encode();
            let request = client
                .prepare(&method, "/v1/objects/hint/create", "rule", &body, payload)
                .expect("request");
            assert_eq!(content_type(&request), Some("application/json"));
            assert_eq!(
                request.body().and_then(|body| body.as_bytes()),
                Some(br#"{"id":1}"#.as_slice())
            );
        }
    }

    #[test]
    fn user_details_post_has_no_json_content_type() {
        let client = client();
        let request = client
            .prepare(&Method::POST, "/v1/user", "userdetails", &RequestBody::Empty, None)
            .expect("request");
        assert_eq!(content_type(&request), None);
        assert!(request.body().is_none());
    }

    #[test]
    fn preset_content_type_is_kept_on_post_and_dropped_on_get() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let client = WallarmClient::builder()
            .base_url("https://api.example.test")
            .headers(headers)
            .build()
            .expect("valid config");

        let post = client
            .prepare(&Method::POST, "/v1/x", "rule", &RequestBody::Empty, None)
            .expect("request");
        assert_eq!(content_type(&post), Some("text/plain"));

        let get = client
            .prepare(&Method::GET, "/v1/x", "rule", &RequestBody::Empty, None)
            .expect("request");
        assert_eq!(content_type(&get), None);
    }

    #[test]
    fn query_body_becomes_raw_url_query() {
        let client = client();
        let body = RequestBody::query("filter[clientid]=7&filter[state]=active&limit=1000");
        let payload = body.encode();
        let request = client
            .prepare(&Method::GET, "/v4/blacklist", "", &body, payload)
            .expect("request");
        assert_eq!(
            request.url().as_str(),
            "https://api.example.test/v4/blacklist?filter[clientid]=7&filter[state]=active&limit=1000"
        );
        assert!(request.body().is_none());
        assert_eq!(content_type(&request), None);
    }

    #[test]
    fn static_headers_and_user_agent_are_attached() {
        let client = client();
        let request = client
            .prepare(&Method::DELETE, "/v2/node/12", "", &RequestBody::Empty, None)
            .expect("request");
        assert_eq!(request.headers()["x-wallarmapi-uuid"], "uuid-1");
        assert_eq!(request.headers()["x-wallarmapi-secret"], "secret-token");
        assert_eq!(request.headers()[USER_AGENT], "wallarm-api-tests");
        assert_eq!(request.url().as_str(), "https://api.example.test/v2/node/12");
    }

    #[test]
    fn debug_redacts_secret() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("uuid-1"));
    }

    #[test]
    fn build_rejects_inverted_retry_bounds() {
        let err = WallarmClient::builder()
            .retry(3, 30, 1)
            .build()
            .expect_err("min above max must be rejected");
        assert!(matches!(err, WallarmError::Config(_)));
    }

    #[test]
    fn build_rejects_missing_credentials() {
        let err = WallarmClient::builder()
            .credentials("", "secret")
            .build()
            .expect_err("empty uuid must be rejected");
        assert!(err.to_string().contains("credentials are not set"));
    }

    #[test]
    fn build_rejects_invalid_base_url() {
        assert!(matches!(
            WallarmClient::new("not a url"),
            Err(WallarmError::Config(_))
        ));
    }

    #[test]
    fn defaults() {
        let client = WallarmClient::builder().build().expect("defaults are valid");
        assert_eq!(client.base_url(), "https://api.wallarm.com");
        assert_eq!(client.retry_policy(), RetryPolicy::default());

        let client = WallarmClient::builder()
            .retry_policy(
                RetryPolicy::new(1, Duration::from_millis(5), Duration::from_millis(10))
                    .expect("valid"),
            )
            .build()
            .expect("valid");
        assert_eq!(client.retry_policy().max_retries(), 1);
    }
}
