//! Chain-agnostic wallet calls

use super::{HandlerServices, MethodHandler, in_namespace};
use crate::registry::Namespace;
use crate::{ChainType, ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

/// Handles `wallet_*` methods
pub struct WalletHandler {
    services: HandlerServices,
}

/// Target of a `wallet_switchNetwork` call
fn switch_target(params: &[Value]) -> Result<(ChainType, Option<String>)> {
    let target = params
        .first()
        .ok_or_else(|| ProviderError::InvalidParams("missing network target".into()))?;
    match target {
        Value::String(chain) => Ok((chain.parse::<ChainType>()?, None)),
        Value::Object(map) => {
            let chain = map
                .get("chainType")
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::InvalidParams("missing chainType".into()))?
                .parse::<ChainType>()?;
            let chain_id = map.get("chainId").and_then(Value::as_str).map(str::to_string);
            Ok((chain, chain_id))
        }
        _ => Err(ProviderError::InvalidParams(
            "network target must be a string or object".into(),
        )),
    }
}

impl WalletHandler {
    /// Create the handler
    pub fn new(services: HandlerServices) -> Self {
        Self { services }
    }

    fn network(&self) -> Value {
        json!({
            "chainType": self.services.session.active_chain().as_str(),
            "chainId": self.services.session.chain_id(),
        })
    }

    async fn switch_network(&self, ctx: &RequestContext) -> Result<Value> {
        let (chain, chain_id) = switch_target(ctx.params())?;
        let session = &self.services.session;
        let same_chain = session.active_chain() == chain;
        if same_chain && chain_id.as_deref().is_none_or(|id| id == session.chain_id()) {
            return Ok(self.network());
        }

        self.services.approve(ctx).await?;
        session.apply_chain(chain, chain_id)?;
        self.services.invalidate_network_reads();
        info!(origin = %ctx.origin(), chain = %chain, "Network switched");
        Ok(self.network())
    }

    async fn balance(&self, ctx: &RequestContext) -> Result<Value> {
        let account = self.services.connected_account(ctx)?;
        let chain = self.services.session.active_chain();
        let call = crate::backend::BackendCall::new(
            chain,
            "getBalance",
            vec![json!(account.id)],
            ctx.origin(),
        )
        .with_account(Some(account));
        self.services.backend(chain)?.call(call).await
    }
}

#[async_trait]
impl MethodHandler for WalletHandler {
    fn name(&self) -> &'static str {
        "wallet"
    }

    fn can_handle(&self, ctx: &RequestContext) -> bool {
        in_namespace(ctx, Namespace::Wallet)
    }

    async fn handle(&self, ctx: &RequestContext) -> Result<Value> {
        match ctx.method() {
            "wallet_connect" => {
                let record = self.services.connect_origin(ctx).await?;
                Ok(json!({
                    "account": record.account(),
                    "network": self.network(),
                }))
            }
            "wallet_disconnect" => {
                let removed = self.services.connections.disconnect(ctx.origin());
                if removed.is_some() {
                    info!(origin = %ctx.origin(), "Origin disconnected");
                }
                Ok(json!(removed.is_some()))
            }
            "wallet_getPermissions" => {
                let record = self.services.connections.get(ctx.origin());
                Ok(json!({
                    "connected": record.is_some(),
                    "account": record.as_ref().map(|r| r.connected_account_id.clone()),
                    "connectedAt": record.map(|r| r.connected_at),
                }))
            }
            "wallet_getAccount" => Ok(json!(self.services.connected_account(ctx)?)),
            "wallet_getNetwork" => Ok(self.network()),
            "wallet_switchNetwork" => self.switch_network(ctx).await,
            "wallet_getBalance" => self.balance(ctx).await,
            other => Err(ProviderError::MethodNotFound(other.to_string())),
        }
    }
}
