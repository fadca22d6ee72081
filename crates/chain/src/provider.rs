//! RPC endpoint handles for the failover set.
//! Uses Alloy providers for type-safe RPC interactions.

use crate::failover::{AllEndpointsFailed, Endpoint, FailoverClient};
use alloy::providers::{Provider, RootProvider};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// One JSON-RPC node.
///
/// The provider is created once and shared by clones.
#[derive(Clone, Debug)]
pub struct RpcEndpoint {
    name: Arc<str>,
    provider: RootProvider,
}

/// Failover set over RPC nodes.
pub type RpcFailover = FailoverClient<RpcEndpoint>;

impl RpcEndpoint {
    /// Create an HTTP endpoint. `name` is what logs show; URLs may carry API keys.
    pub fn http(name: impl Into<Arc<str>>, url: &str) -> Result<Self> {
        let name = name.into();
        let parsed = url
            .parse()
            .with_context(|| format!("invalid RPC url for endpoint {name}"))?;
        Ok(Self {
            name,
            provider: RootProvider::new_http(parsed),
        })
    }

    /// Create endpoints named `primary`, `backup-1`, `backup-2`, ... in order.
    pub fn from_urls(urls: &[String]) -> Result<Vec<Self>> {
        urls.iter()
            .enumerate()
            .map(|(i, url)| {
                let name = if i == 0 {
                    "primary".to_string()
                } else {
                    format!("backup-{i}")
                };
                Self::http(name, url)
            })
            .collect()
    }

    /// Underlying provider.
    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }
}

impl Endpoint for RpcEndpoint {
    fn id(&self) -> &str {
        &self.name
    }
}

impl FailoverClient<RpcEndpoint> {
    /// Current block number from the first responsive node.
    pub async fn block_number(&self) -> Result<u64, AllEndpointsFailed> {
        self.call("eth_blockNumber", |ep| async move {
            Ok(ep.provider.get_block_number().await?)
        })
        .await
    }

    /// Chain id from the first responsive node.
    pub async fn chain_id(&self) -> Result<u64, AllEndpointsFailed> {
        self.call("eth_chainId", |ep| async move {
            Ok(ep.provider.get_chain_id().await?)
        })
        .await
    }

    /// Check connectivity and that the nodes serve the expected chain.
    pub async fn verify_chain(&self, expected_chain_id: u64) -> Result<u64> {
        let chain_id = self.chain_id().await?;
        anyhow::ensure!(
            chain_id == expected_chain_id,
            "RPC reports chain id {chain_id}, expected {expected_chain_id}"
        );
        let block = self.block_number().await?;
        info!(
            endpoints = self.endpoints().len(),
            chain_id,
            block,
            "Provider connection verified"
        );
        Ok(block)
    }
}
