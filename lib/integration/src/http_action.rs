//! The secure HTTP action.
//!
//! An HTTP action node calls a customer-configured endpoint with templated
//! URL, query parameters, headers, auth and body. Every call is checked
//! before anything touches the network:
//!
//! - the resolved URL must be HTTPS
//! - its host must equal, or be a subdomain of, an allowlisted domain; an
//!   empty allowlist rejects everything
//!
//! The transport then refuses redirects, caps the response size (checked
//! against the declared length and again while reading) and enforces a
//! timeout. None of these failures is an error to the caller: every call
//! produces an [`HttpActionOutcome`] whose `success` flag picks the node's
//! `success` or `error` edge.

use crate::error::HttpActionError;
use crate::json_path;
use crate::template;
use async_trait::async_trait;
use chatflow_workflow::{HttpActionConfig, HttpAuth, HttpBody, HttpMethod};
use reqwest::Url;
use reqwest::redirect::Policy;
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default response size cap (5 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 5 * 1024 * 1024;

/// Engine-wide limits applied to every HTTP action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpActionLimits {
    /// Used when the node does not set its own timeout.
    pub timeout: Duration,
    pub max_response_bytes: usize,
}

impl Default for HttpActionLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// Domains HTTP actions may call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowlist {
    domains: Vec<String>,
}

impl DomainAllowlist {
    /// Creates an allowlist. Entries are lowercased and a leading `*.` or
    /// `.` is dropped, so `*.example.com` means `example.com` and its
    /// subdomains.
    #[must_use]
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .filter_map(|domain| normalize_domain(domain.as_ref()))
            .collect();
        Self { domains }
    }

    /// Parses the stored setting: a JSON array of strings, or a comma or
    /// newline separated list.
    #[must_use]
    pub fn parse(setting: &str) -> Self {
        let trimmed = setting.trim();
        if trimmed.starts_with('[') {
            if let Ok(domains) = serde_json::from_str::<Vec<String>>(trimmed) {
                return Self::new(domains);
            }
        }
        Self::new(trimmed.split([',', '\n']))
    }

    /// Returns true if no domain is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Returns true if `host` equals or is a subdomain of an entry.
    #[must_use]
    pub fn permits(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

fn normalize_domain(raw: &str) -> Option<String> {
    let domain = raw.trim().trim_matches('"');
    let domain = domain
        .strip_prefix("*.")
        .or_else(|| domain.strip_prefix('.'))
        .unwrap_or(domain)
        .trim_end_matches('.')
        .to_ascii_lowercase();
    (!domain.is_empty()).then_some(domain)
}

/// Credentials applied by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAuth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

/// A fully resolved request body.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpRequestBody {
    Empty,
    Json(JsonValue),
    Form(Vec<(String, String)>),
}

/// A request that passed every pre-flight check.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub auth: RequestAuth,
    pub headers: Vec<(String, String)>,
    pub body: HttpRequestBody,
    pub timeout: Duration,
}

/// Status and raw body of a completed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs prepared requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request and reads the full response body.
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, HttpActionError>;
}

/// reqwest transport: redirects disabled, body read in capped chunks.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReqwestTransport {
    /// Creates a transport with the given response size cap.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(max_response_bytes: usize) -> Result<Self, HttpActionError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| HttpActionError::RequestFailed {
                details: e.to_string(),
            })?;
        Ok(Self {
            client,
            max_response_bytes,
        })
    }

    fn classify(error: &reqwest::Error, timeout: Duration) -> HttpActionError {
        if error.is_timeout() {
            HttpActionError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            HttpActionError::RequestFailed {
                details: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, HttpActionError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes()).map_err(
            |e| HttpActionError::RequestFailed {
                details: e.to_string(),
            },
        )?;
        let timeout = request.timeout;

        let mut builder = self
            .client
            .request(method, request.url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.auth {
            RequestAuth::None => builder,
            RequestAuth::Bearer(token) => builder.bearer_auth(token),
            RequestAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        };
        builder = match &request.body {
            HttpRequestBody::Empty => builder,
            HttpRequestBody::Json(body) => builder.json(body),
            HttpRequestBody::Form(fields) => builder.form(fields),
        };

        let mut response = builder
            .send()
            .await
            .map_err(|e| Self::classify(&e, timeout))?;

        let status = response.status();
        if status.is_redirection() {
            return Err(HttpActionError::Redirect {
                status: status.as_u16(),
            });
        }

        let limit = self.max_response_bytes;
        if response
            .content_length()
            .is_some_and(|length| length > limit as u64)
        {
            return Err(HttpActionError::ResponseTooLarge { limit_bytes: limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::classify(&e, timeout))?
        {
            if body.len() + chunk.len() > limit {
                return Err(HttpActionError::ResponseTooLarge { limit_bytes: limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Result of one HTTP action.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpActionOutcome {
    /// True only for a completed call with a 2xx status.
    pub success: bool,
    pub status: Option<u16>,
    /// Parsed JSON body; non-JSON bodies are kept as a string.
    pub data: JsonValue,
    pub error: Option<String>,
    /// Values extracted by the node's response mapping.
    pub mapped: Map<String, JsonValue>,
}

impl HttpActionOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            data: JsonValue::Null,
            error: Some(error.into()),
            mapped: Map::new(),
        }
    }

    /// Returns the named outcome handle: `success` or `error`.
    #[must_use]
    pub const fn handle(&self) -> &'static str {
        if self.success { "success" } else { "error" }
    }

    /// Returns the raw result as stored in the conversation context.
    #[must_use]
    pub fn to_context_value(&self) -> JsonValue {
        json!({
            "success": self.success,
            "status": self.status,
            "data": self.data,
            "error": self.error,
        })
    }
}

/// Executes HTTP action nodes.
#[derive(Clone)]
pub struct SecureHttpAction {
    transport: Arc<dyn HttpTransport>,
    limits: HttpActionLimits,
}

impl SecureHttpAction {
    /// Creates an executor over a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, limits: HttpActionLimits) -> Self {
        Self { transport, limits }
    }

    /// Resolves templates and runs the pre-flight checks.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the request must not be sent.
    pub fn prepare(
        &self,
        config: &HttpActionConfig,
        scope: &JsonValue,
        allowlist: &DomainAllowlist,
    ) -> Result<PreparedRequest, String> {
        let raw_url = template::resolve(&config.url, scope);
        let mut url =
            Url::parse(raw_url.trim()).map_err(|e| format!("invalid URL '{raw_url}': {e}"))?;

        if url.scheme() != "https" {
            return Err(format!(
                "only HTTPS URLs are allowed, got '{}'",
                url.scheme()
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| "URL has no host".to_string())?
            .to_string();
        if allowlist.is_empty() {
            return Err("no domains are allowlisted for HTTP actions".to_string());
        }
        if !allowlist.permits(&host) {
            return Err(format!("domain '{host}' is not in the allowlist"));
        }

        let query: Vec<(String, String)> = resolve_pairs(&config.query_params, scope);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query {
                pairs.append_pair(key, value);
            }
        }

        let auth = match &config.auth {
            HttpAuth::None => RequestAuth::None,
            HttpAuth::Bearer { token } => RequestAuth::Bearer(template::resolve(token, scope)),
            HttpAuth::Basic { username, password } => RequestAuth::Basic {
                username: template::resolve(username, scope),
                password: template::resolve(password, scope),
            },
        };

        let body = match &config.body {
            HttpBody::None => HttpRequestBody::Empty,
            HttpBody::Json { content } if content.trim().is_empty() => HttpRequestBody::Empty,
            HttpBody::Json { content } => template::resolve_json_text(content, scope)
                .map(HttpRequestBody::Json)
                .ok_or_else(|| "request body is not valid JSON".to_string())?,
            HttpBody::Form { fields } => HttpRequestBody::Form(resolve_pairs(fields, scope)),
        };

        Ok(PreparedRequest {
            method: config.method,
            url,
            auth,
            headers: resolve_pairs(&config.headers, scope),
            body,
            timeout: config
                .timeout_ms
                .map_or(self.limits.timeout, Duration::from_millis),
        })
    }

    /// Runs one HTTP action.
    ///
    /// Never fails: rejections and transport failures produce an
    /// unsuccessful outcome carrying the reason.
    #[instrument(skip_all, fields(method = config.method.as_str()))]
    pub async fn execute(
        &self,
        config: &HttpActionConfig,
        scope: &JsonValue,
        allowlist: &DomainAllowlist,
    ) -> HttpActionOutcome {
        let request = match self.prepare(config, scope, allowlist) {
            Ok(request) => request,
            Err(reason) => {
                warn!(%reason, "http action rejected");
                return HttpActionOutcome::failed(reason);
            }
        };
        debug!(url = %request.url, "sending http action");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "http action failed");
                return HttpActionOutcome::failed(e.to_string());
            }
        };

        let success = (200..300).contains(&response.status);
        let data = parse_body(&response.body);
        let mapped = if success {
            map_response(config, &data)
        } else {
            Map::new()
        };
        debug!(status = response.status, success, "http action completed");

        HttpActionOutcome {
            success,
            status: Some(response.status),
            error: (!success).then(|| format!("HTTP {}", response.status)),
            data,
            mapped,
        }
    }
}

fn resolve_pairs(
    pairs: &[chatflow_workflow::KeyValue],
    scope: &JsonValue,
) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|pair| {
            (
                template::resolve(&pair.key, scope).trim().to_string(),
                template::resolve(&pair.value, scope),
            )
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn parse_body(body: &[u8]) -> JsonValue {
    if body.is_empty() {
        return JsonValue::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(body).into_owned()))
}

fn map_response(config: &HttpActionConfig, data: &JsonValue) -> Map<String, JsonValue> {
    config
        .response_mapping
        .iter()
        .filter(|mapping| !mapping.variable.trim().is_empty())
        .filter_map(|mapping| {
            json_path::lookup(data, &mapping.path)
                .map(|value| (mapping.variable.trim().to_string(), value.clone()))
        })
        .collect()
}
