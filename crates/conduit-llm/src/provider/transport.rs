//! HTTP transport shared by all adapters, with retries and cancellation

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicErrorResponse;
use crate::protocol::gemini::GeminiErrorResponse;
use crate::protocol::openai::OpenAiErrorResponse;

/// Delay before the first retry; doubled on each further attempt
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for a single backoff delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Credentials obtained from an out-of-band token source
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer token
    pub token: SecretString,
    /// Endpoint the token is bound to, overriding the configured base URL
    pub base_url: Option<Url>,
}

/// Source of refreshed tokens (for example an OAuth device flow)
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Current credentials, refreshing them if needed
    async fn credentials(&self) -> Result<Credentials, LlmError>;
}

/// Where the client takes its credentials from on each attempt
#[derive(Clone, Default)]
pub enum CredentialSource {
    /// No authentication
    #[default]
    None,
    /// Fixed API key
    Static(SecretString),
    /// Token fetched before every attempt
    Dynamic(Arc<dyn CredentialsProvider>),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Static(_) => f.write_str("Static(..)"),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// How the credential is attached to a request
#[derive(Debug, Clone)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// The raw key in a vendor header (`x-api-key`, `x-goog-api-key`)
    Header(HeaderName),
}

/// Client for one vendor endpoint
#[derive(Debug, Clone)]
pub struct VendorClient {
    http: Client,
    base_url: Url,
    headers: HeaderMap,
    credentials: CredentialSource,
    auth: AuthScheme,
    max_retries: u32,
    retry_delay: Duration,
}

/// Settings for [`VendorClient::new`]
#[derive(Debug, Clone)]
pub struct VendorClientConfig {
    pub base_url: Url,
    pub headers: HeaderMap,
    pub credentials: CredentialSource,
    pub auth: AuthScheme,
    pub timeout: Duration,
    pub proxy: Option<Url>,
    pub max_retries: u32,
}

impl VendorClient {
    /// Build the underlying HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the proxy or TLS setup is rejected.
    pub fn new(config: VendorClientConfig) -> Result<Self, LlmError> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| LlmError::Config(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url,
            headers: config.headers,
            credentials: config.credentials,
            auth: config.auth,
            max_retries: config.max_retries,
            retry_delay: BASE_RETRY_DELAY,
        })
    }

    /// Override the initial backoff delay
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Configured base URL
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Headers sent with every request
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// POST a JSON body and decode the JSON reply
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, an error that is
    /// not retryable, or [`LlmError::Cancelled`] when `cancel` fires.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, LlmError> {
        let response = self.post(path, body, cancel).await?;

        let read = response.json::<T>();
        let decoded = match cancel {
            Some(token) => tokio::select! {
                () = token.cancelled() => return Err(LlmError::Cancelled),
                decoded = read => decoded,
            },
            None => read.await,
        };

        decoded.map_err(|e| {
            if e.is_decode() {
                LlmError::Streaming(format!("failed to parse response: {e}"))
            } else {
                LlmError::transport(e)
            }
        })
    }

    /// POST a JSON body and return the successful response unread
    ///
    /// Used for streaming, where the caller consumes the body.
    ///
    /// # Errors
    ///
    /// As for [`Self::post_json`].
    pub async fn post(&self, path: &str, body: &Value, cancel: Option<&CancellationToken>) -> Result<Response, LlmError> {
        let mut attempt = 0;

        loop {
            let result = match cancel {
                Some(token) => tokio::select! {
                    () = token.cancelled() => return Err(LlmError::Cancelled),
                    result = self.send_once(path, body) => result,
                },
                None => self.send_once(path, body).await,
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= self.max_retries {
                return Err(error);
            }

            let delay = self.backoff(attempt);
            attempt += 1;
            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying vendor request"
            );

            match cancel {
                Some(token) => tokio::select! {
                    () = token.cancelled() => return Err(LlmError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.retry_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    async fn send_once(&self, path: &str, body: &Value) -> Result<Response, LlmError> {
        let (base_url, credential) = self.resolve_credentials().await?;
        let url = endpoint_url(&base_url, path);

        let mut builder = self.http.post(url).headers(self.headers.clone()).json(body);

        if let Some(secret) = credential {
            let value = match self.auth {
                AuthScheme::Bearer => format!("Bearer {}", secret.expose_secret()),
                AuthScheme::Header(_) => secret.expose_secret().to_owned(),
            };
            let mut value = HeaderValue::from_str(&value)
                .map_err(|_| LlmError::Config("credential is not a valid header value".to_owned()))?;
            value.set_sensitive(true);

            let name = match &self.auth {
                AuthScheme::Bearer => AUTHORIZATION,
                AuthScheme::Header(name) => name.clone(),
            };
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(error = %e, "vendor request failed before a response");
            LlmError::transport(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, "vendor returned an error status");

        Err(LlmError::Upstream {
            status,
            message: upstream_message(&body),
        })
    }

    async fn resolve_credentials(&self) -> Result<(Url, Option<SecretString>), LlmError> {
        match &self.credentials {
            CredentialSource::None => Ok((self.base_url.clone(), None)),
            CredentialSource::Static(key) => Ok((self.base_url.clone(), Some(key.clone()))),
            CredentialSource::Dynamic(provider) => {
                let credentials = provider.credentials().await?;
                let base_url = credentials.base_url.unwrap_or_else(|| self.base_url.clone());
                Ok((base_url, Some(credentials.token)))
            }
        }
    }
}

/// Join a base URL and a relative path, tolerating a trailing slash
pub fn endpoint_url(base_url: &Url, path: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Human-readable message from a vendor error body
///
/// All three wire formats nest the message under `error.message`; Gemini
/// also reports a status string (for example `CANCELLED`), which is kept
/// as a prefix. Bodies matching none of the envelopes are returned trimmed.
pub fn upstream_message(body: &str) -> String {
    match serde_json::from_str::<UpstreamError>(body) {
        Ok(UpstreamError::Gemini(response)) => format!("{}: {}", response.error.status, response.error.message),
        Ok(UpstreamError::Anthropic(response)) => response.error.message,
        Ok(UpstreamError::OpenAi(response)) => response.error.message,
        Err(_) => body.trim().to_owned(),
    }
}

/// Decodes a body as one of the vendor error envelopes, if it is one
pub fn decode_upstream_error(body: &str) -> Option<String> {
    serde_json::from_str::<UpstreamError>(body).ok().map(|_| upstream_message(body))
}

/// Error envelopes in the order they are told apart: Gemini carries a
/// status string, Anthropic a typed detail, `OpenAI` a bare message
#[derive(Deserialize)]
#[serde(untagged)]
enum UpstreamError {
    Gemini(GeminiErrorResponse),
    Anthropic(AnthropicErrorResponse),
    OpenAi(OpenAiErrorResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_urls() {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        assert_eq!(endpoint_url(&base, "/chat/completions"), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn extracts_vendor_messages() {
        assert_eq!(upstream_message(r#"{"error":{"message":"bad key","type":"auth"}}"#), "bad key");
        assert_eq!(
            upstream_message(r#"{"error":{"code":499,"message":"gone","status":"CANCELLED"}}"#),
            "CANCELLED: gone"
        );
        assert_eq!(
            upstream_message(r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#),
            "busy"
        );
        assert_eq!(upstream_message(r#"{"error":{"message":"quota","code":"insufficient_quota"}}"#), "quota");
        assert_eq!(upstream_message("plain failure\n"), "plain failure");
        assert_eq!(upstream_message(r#"{"detail":"nope"}"#), r#"{"detail":"nope"}"#);
    }

    #[test]
    fn only_error_envelopes_decode_as_upstream_errors() {
        assert_eq!(decode_upstream_error(r#"{"error":{"message":"slow down"}}"#).as_deref(), Some("slow down"));
        assert!(decode_upstream_error(r#"{"choices":[]}"#).is_none());
        assert!(decode_upstream_error("not json").is_none());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let client = VendorClient::new(VendorClientConfig {
            base_url: Url::parse("http://localhost").unwrap(),
            headers: HeaderMap::new(),
            credentials: CredentialSource::None,
            auth: AuthScheme::Bearer,
            timeout: Duration::from_secs(1),
            proxy: None,
            max_retries: 3,
        })
        .unwrap()
        .with_retry_delay(Duration::from_millis(100));

        assert_eq!(client.backoff(0), Duration::from_millis(100));
        assert_eq!(client.backoff(2), Duration::from_millis(400));
        assert_eq!(client.backoff(20), MAX_RETRY_DELAY);
    }
}
