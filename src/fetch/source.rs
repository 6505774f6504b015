//! Network and decoding seams used by the coordinator.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::cache::RequestKey;
use crate::infra::error::InfraError;

use super::config::FetchConfig;
use super::error::FetchError;

/// Issues the request behind a key and returns the raw success body.
///
/// Implementations must map transport problems to [`FetchError::Network`] and
/// non-success statuses to [`FetchError::Response`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, key: &RequestKey) -> Result<Bytes, FetchError>;
}

/// Turns a response body into the caller's value type.
pub trait Decoder<V>: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<V, FetchError>;
}

/// Decodes JSON bodies with `serde_json`.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonDecoder").finish()
    }
}

impl<T: DeserializeOwned> Decoder<T> for JsonDecoder<T> {
    fn decode(&self, body: &[u8]) -> Result<T, FetchError> {
        serde_json::from_slice(body).map_err(|err| FetchError::decode(err.to_string()))
    }
}

/// Adapts a plain function into a [`Decoder`].
pub struct FnDecoder<F>(F);

/// Build a decoder from a closure returning a human-readable error.
pub fn decode_with<V, F>(decode: F) -> FnDecoder<F>
where
    F: Fn(&[u8]) -> Result<V, String> + Send + Sync,
{
    FnDecoder(decode)
}

impl<V, F> Decoder<V> for FnDecoder<F>
where
    F: Fn(&[u8]) -> Result<V, String> + Send + Sync,
{
    fn decode(&self, body: &[u8]) -> Result<V, FetchError> {
        (self.0)(body).map_err(FetchError::Decode)
    }
}

/// GET-style fetcher backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
    base: Option<Url>,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            base: config.base_url.clone(),
            timeout: config.request_timeout,
        })
    }

    /// Resolve a key into the URL to request.
    ///
    /// Absolute keys are used as-is; relative keys need a base URL.
    pub fn resolve(&self, key: &RequestKey) -> Result<Url, FetchError> {
        match Url::parse(key.as_str()) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match self.base.as_ref() {
                Some(base) => base.join(key.as_str()).map_err(|err| {
                    FetchError::network(format!("invalid request url `{key}`: {err}"))
                }),
                None => Err(FetchError::network(format!(
                    "relative key `{key}` requires a base url"
                ))),
            },
            Err(err) => Err(FetchError::network(format!(
                "invalid request url `{key}`: {err}"
            ))),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self), fields(key = %key))]
    async fn fetch(&self, key: &RequestKey) -> Result<Bytes, FetchError> {
        let url = self.resolve(key)?;

        let mut request = self.client.get(url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Request returned non-success status");
            return Err(FetchError::response(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|err| FetchError::network(err.to_string()))
    }
}
