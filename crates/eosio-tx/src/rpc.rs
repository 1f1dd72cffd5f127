//! RPC capability over the chain's HTTP/JSON API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    models::{
        BlockInfo, ChainInfo, PushTransactionRequest, PushTransactionResponse, RawAbi,
        RequiredKeysRequest, RequiredKeysResponse,
    },
    name::Name,
    providers::{ChainError, RpcProvider, RpcProviderError},
};

/// HTTP transport tuning.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HttpRpcConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpRpcConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Chain error envelope returned with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ChainErrorEnvelope {
    /// Chain exception.
    error: ChainError,
}

/// RPC provider that talks to a node's `/v1/chain` endpoints.
#[derive(Debug, Clone)]
pub struct HttpRpcProvider {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Node base URL without trailing slash.
    base_url: String,
}

impl HttpRpcProvider {
    /// Creates a provider with default tuning.
    ///
    /// # Errors
    ///
    /// Returns [`RpcProviderError::Transport`] when HTTP client creation fails.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RpcProviderError> {
        Self::with_config(base_url, &HttpRpcConfig::default())
    }

    /// Creates a provider with explicit tuning.
    ///
    /// # Errors
    ///
    /// Returns [`RpcProviderError::Transport`] when HTTP client creation fails.
    pub fn with_config(
        base_url: impl Into<String>,
        config: &HttpRpcConfig,
    ) -> Result<Self, RpcProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| RpcProviderError::Transport {
                method: "client",
                source: Box::new(source),
            })?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, base_url })
    }

    /// Returns the endpoint URL of one chain API method.
    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/chain/{method}", self.base_url)
    }

    /// Posts `body` to a chain API method and decodes the response.
    async fn call<B, T>(&self, method: &'static str, body: &B) -> Result<T, RpcProviderError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        tracing::trace!(method, "chain rpc request");
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|source| RpcProviderError::Transport {
                method,
                source: Box::new(source),
            })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| RpcProviderError::Transport {
                method,
                source: Box::new(source),
            })?;
        decode_response(method, status.is_success(), status.as_u16(), &bytes)
    }
}

/// Decodes a chain API response body.
fn decode_response<T>(
    method: &'static str,
    success: bool,
    status: u16,
    body: &[u8],
) -> Result<T, RpcProviderError>
where
    T: DeserializeOwned,
{
    if success {
        return serde_json::from_slice(body).map_err(|error| RpcProviderError::InvalidResponse {
            method,
            message: error.to_string(),
        });
    }
    match serde_json::from_slice::<ChainErrorEnvelope>(body) {
        Ok(envelope) => Err(RpcProviderError::Chain {
            method,
            source: envelope.error,
        }),
        Err(_) => Err(RpcProviderError::Transport {
            method,
            source: format!(
                "http status {status}: {}",
                String::from_utf8_lossy(body).chars().take(256).collect::<String>()
            )
            .into(),
        }),
    }
}

#[async_trait]
impl RpcProvider for HttpRpcProvider {
    async fn get_info(&self) -> Result<ChainInfo, RpcProviderError> {
        self.call("get_info", &serde_json::json!({})).await
    }

    async fn get_block(&self, block_num: u32) -> Result<BlockInfo, RpcProviderError> {
        self.call(
            "get_block",
            &serde_json::json!({ "block_num_or_id": block_num }),
        )
        .await
    }

    async fn get_raw_abi(&self, account: &Name) -> Result<RawAbi, RpcProviderError> {
        self.call(
            "get_raw_abi",
            &serde_json::json!({ "account_name": account }),
        )
        .await
    }

    async fn get_required_keys(
        &self,
        request: &RequiredKeysRequest,
    ) -> Result<Vec<String>, RpcProviderError> {
        let response: RequiredKeysResponse = self.call("get_required_keys", request).await?;
        Ok(response.required_keys)
    }

    async fn push_transaction(
        &self,
        request: &PushTransactionRequest,
    ) -> Result<PushTransactionResponse, RpcProviderError> {
        self.call("push_transaction", request).await
    }
}
