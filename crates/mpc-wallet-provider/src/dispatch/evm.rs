//! EVM provider calls

use super::{HandlerServices, MethodHandler, in_namespace};
use crate::registry::Namespace;
use crate::{ChainType, ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

/// Handles `eth_*`, `net_*`, `personal_sign` and the EVM `wallet_*` extensions
pub struct EvmHandler {
    services: HandlerServices,
}

/// Decimal form of a hex chain ID, as `net_version` reports it
fn net_version(chain_id: &str) -> Result<String> {
    let digits = chain_id.strip_prefix("0x").unwrap_or(chain_id);
    u64::from_str_radix(digits, 16)
        .map(|id| id.to_string())
        .map_err(|_| ProviderError::Chain(format!("malformed chain id: {}", chain_id)))
}

impl EvmHandler {
    /// Create the handler
    pub fn new(services: HandlerServices) -> Self {
        Self { services }
    }

    async fn chain_id(&self, ctx: &RequestContext) -> Result<String> {
        if self.services.session.active_chain() == ChainType::Evm {
            return Ok(self.services.session.chain_id());
        }
        let value = self.services.forward(ChainType::Evm, ctx, None, None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Chain("eth_chainId returned a non-string".into()))
    }

    fn accounts(&self, ctx: &RequestContext) -> Value {
        match self.services.connections.get(ctx.origin()) {
            Some(record) => json!([record.connected_account_id]),
            None => json!([]),
        }
    }

    async fn switch_chain(&self, ctx: &RequestContext) -> Result<Value> {
        let chain_id = ctx
            .require_param(0)?
            .get("chainId")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidParams("missing chainId".into()))?
            .to_string();

        let session = &self.services.session;
        if session.active_chain() == ChainType::Evm && session.chain_id() == chain_id {
            return Ok(Value::Null);
        }

        self.services.approve(ctx).await?;
        session.apply_chain(ChainType::Evm, Some(chain_id.clone()))?;
        self.services.invalidate_network_reads();
        info!(origin = %ctx.origin(), chain_id = %chain_id, "EVM chain switched");
        Ok(Value::Null)
    }
}

#[async_trait]
impl MethodHandler for EvmHandler {
    fn name(&self) -> &'static str {
        "evm"
    }

    fn can_handle(&self, ctx: &RequestContext) -> bool {
        in_namespace(ctx, Namespace::Evm)
    }

    async fn handle(&self, ctx: &RequestContext) -> Result<Value> {
        match ctx.method() {
            "eth_requestAccounts" => {
                let record = self.services.connect_origin(ctx).await?;
                Ok(json!([record.connected_account_id]))
            }
            "eth_accounts" => Ok(self.accounts(ctx)),
            "eth_chainId" => Ok(json!(self.chain_id(ctx).await?)),
            "net_version" => Ok(json!(net_version(&self.chain_id(ctx).await?)?)),
            "wallet_switchEthereumChain" => self.switch_chain(ctx).await,
            "wallet_addEthereumChain" => {
                let approval = self.services.approve(ctx).await?;
                self.services
                    .forward(ChainType::Evm, ctx, None, Some(approval))
                    .await
            }
            "wallet_watchAsset" => {
                self.services.approve(ctx).await?;
                Ok(json!(true))
            }
            "eth_sendTransaction"
            | "personal_sign"
            | "eth_sign"
            | "eth_signTypedData_v4"
            | "eth_signTypedData_v3"
            | "eth_signTypedData" => self.services.approve_and_forward(ChainType::Evm, ctx).await,
            "eth_blockNumber"
            | "eth_gasPrice"
            | "eth_getBalance"
            | "eth_getTransactionCount"
            | "eth_getTransactionReceipt"
            | "eth_call"
            | "eth_estimateGas" => self.services.forward(ChainType::Evm, ctx, None, None).await,
            other => Err(ProviderError::MethodNotFound(other.to_string())),
        }
    }
}
