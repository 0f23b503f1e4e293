//! Provider-internal commands

use super::{HandlerServices, MethodHandler, in_namespace};
use crate::registry::{self, Namespace};
use crate::{ProviderError, RequestContext, Result, VERSION};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Handles `ping`, `getVersion`, `getProviderState`, `getSupportedMethods`
pub struct InternalHandler {
    services: HandlerServices,
}

impl InternalHandler {
    /// Create the handler
    pub fn new(services: HandlerServices) -> Self {
        Self { services }
    }

    fn provider_state(&self, ctx: &RequestContext) -> Value {
        let session = self.services.session.snapshot();
        let connection = self.services.connections.get(ctx.origin());
        json!({
            "chainType": session.chain.as_str(),
            "chainId": session.chain_id,
            "isLocked": session.locked,
            "isConnected": connection.is_some(),
            "account": connection.map(|c| c.connected_account_id),
            "isHardwareSigner": self.services.session.is_hardware_signer(),
        })
    }
}

#[async_trait]
impl MethodHandler for InternalHandler {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn can_handle(&self, ctx: &RequestContext) -> bool {
        in_namespace(ctx, Namespace::Internal)
    }

    async fn handle(&self, ctx: &RequestContext) -> Result<Value> {
        match ctx.method() {
            "ping" => Ok(json!("pong")),
            "getVersion" => Ok(json!(VERSION)),
            "getProviderState" => Ok(self.provider_state(ctx)),
            "getSupportedMethods" => Ok(json!(registry::names())),
            other => Err(ProviderError::MethodNotFound(other.to_string())),
        }
    }
}
