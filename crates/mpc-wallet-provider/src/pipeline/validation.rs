//! Stage 7: reject malformed signable payloads before anyone sees them

use super::{Middleware, Next};
use crate::registry::PayloadKind;
use crate::{ProviderError, RequestContext, Result, typed_data};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Deep-validates typed data and plain messages
pub struct ValidationStage;

/// Check a plain signable message: non-empty text, or well-formed hex
pub fn validate_message(value: &Value) -> Result<()> {
    let message = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidParams("message must be a string".into()))?;
    if message.is_empty() {
        return Err(ProviderError::InvalidParams("message must not be empty".into()));
    }
    if let Some(digits) = message.strip_prefix("0x") {
        if digits.is_empty() || hex::decode(digits).is_err() {
            return Err(ProviderError::InvalidParams("message is not valid hex".into()));
        }
    }
    Ok(())
}

#[async_trait]
impl Middleware for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> Result<Value> {
        let Some(payload) = ctx.config().payload else {
            return next.run(ctx).await;
        };

        let value = ctx.require_param(payload.param())?;
        let checked = match payload {
            PayloadKind::TypedData { .. } => typed_data::validate(value)
                .map(|root| debug!(method = %ctx.method(), root = %root, "Typed data validated"))
                .map_err(ProviderError::from),
            PayloadKind::Message { .. } => validate_message(value),
        };

        if let Err(e) = checked {
            warn!(origin = %ctx.origin(), method = %ctx.method(), error = %e, "Invalid payload");
            return Err(e);
        }
        next.run(ctx).await
    }
}
