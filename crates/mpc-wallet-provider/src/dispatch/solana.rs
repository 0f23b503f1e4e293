//! Solana wallet-standard calls

use super::{HandlerServices, MethodHandler, in_namespace};
use crate::registry::Namespace;
use crate::{ChainType, ProviderError, RequestContext, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

/// Handles `solana_*` methods
pub struct SolanaHandler {
    services: HandlerServices,
}

impl SolanaHandler {
    /// Create the handler
    pub fn new(services: HandlerServices) -> Self {
        Self { services }
    }

    async fn sign_in(&self, ctx: &RequestContext) -> Result<Value> {
        let approval = self.services.approve(ctx).await?;
        // Signing in connects the origin
        let record = match self.services.connections.get(ctx.origin()) {
            Some(record) => record,
            None => crate::pipeline::apply_connection(
                &approval,
                ctx.origin(),
                self.services.session.as_ref(),
                self.services.connections.as_ref(),
            )?,
        };
        let signed = self
            .services
            .forward(ChainType::Solana, ctx, Some(record.account()), Some(approval))
            .await?;
        Ok(json!({
            "publicKey": record.connected_account_id,
            "signed": signed,
        }))
    }
}

#[async_trait]
impl MethodHandler for SolanaHandler {
    fn name(&self) -> &'static str {
        "solana"
    }

    fn can_handle(&self, ctx: &RequestContext) -> bool {
        in_namespace(ctx, Namespace::Solana)
    }

    async fn handle(&self, ctx: &RequestContext) -> Result<Value> {
        match ctx.method() {
            "solana_connect" => {
                let record = self.services.connect_origin(ctx).await?;
                Ok(json!({ "publicKey": record.connected_account_id }))
            }
            "solana_disconnect" => {
                let removed = self.services.connections.disconnect(ctx.origin()).is_some();
                if removed {
                    info!(origin = %ctx.origin(), "Origin disconnected");
                }
                Ok(json!(removed))
            }
            "solana_getAccount" => {
                let account = self.services.connected_account(ctx)?;
                Ok(json!({ "publicKey": account.id, "kind": account.kind }))
            }
            "solana_signIn" => self.sign_in(ctx).await,
            "solana_signMessage"
            | "solana_signTransaction"
            | "solana_signAllTransactions"
            | "solana_signAndSendTransaction" => {
                self.services
                    .approve_and_forward(ChainType::Solana, ctx)
                    .await
            }
            "solana_getBalance" | "solana_getLatestBlockhash" => {
                self.services
                    .forward(ChainType::Solana, ctx, None, None)
                    .await
            }
            other => Err(ProviderError::MethodNotFound(other.to_string())),
        }
    }
}
