//! Request context
//!
//! A raw call joined with its registry entry. Built once per attempt and
//! never mutated; a drained request gets a fresh context.

use crate::registry::{self, MethodConfig};
use crate::{ProviderError, Result, RpcRequest};
use serde_json::Value;
use tokio::time::Instant;

/// One call as seen by the pipeline and dispatcher
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: RpcRequest,
    config: &'static MethodConfig,
    attempt: u32,
    queued_at: Option<Instant>,
}

impl RequestContext {
    /// Join a request with its registry entry
    pub fn build(request: RpcRequest) -> Result<Self> {
        let config = registry::lookup(&request.method)?;
        Ok(Self::with_config(request, config))
    }

    /// Join a request with an explicit method config
    pub fn with_config(request: RpcRequest, config: &'static MethodConfig) -> Self {
        Self {
            request,
            config,
            attempt: 1,
            queued_at: None,
        }
    }

    /// Rebuild from scratch for the next attempt
    pub fn rebuild(&self) -> Result<Self> {
        let mut next = Self::build(self.request.clone())?;
        next.attempt = self.attempt + 1;
        next.queued_at = self.queued_at;
        Ok(next)
    }

    /// Rebuild for the turn the approval queue handed out. The earliest
    /// queue time is kept, so the queue timeout spans every attempt.
    pub fn replay_after(&self, queued_at: Instant) -> Result<Self> {
        let mut next = self.rebuild()?;
        next.queued_at = Some(self.queued_at.unwrap_or(queued_at));
        Ok(next)
    }

    /// The raw request
    pub fn request(&self) -> &RpcRequest {
        &self.request
    }

    /// Method policy
    pub fn config(&self) -> &'static MethodConfig {
        self.config
    }

    /// Caller origin
    pub fn origin(&self) -> &str {
        &self.request.origin
    }

    /// Method name
    pub fn method(&self) -> &str {
        &self.request.method
    }

    /// Positional parameters
    pub fn params(&self) -> &[Value] {
        &self.request.params
    }

    /// Parameter at an index
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.request.params.get(index)
    }

    /// Parameter at an index, or an invalid-params error
    pub fn require_param(&self, index: usize) -> Result<&Value> {
        self.param(index).ok_or_else(|| {
            ProviderError::InvalidParams(format!(
                "{} expects a parameter at position {}",
                self.method(),
                index
            ))
        })
    }

    /// 1 for the original run, incremented on each replay
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Check if this context belongs to a replayed run
    pub fn is_replay(&self) -> bool {
        self.attempt > 1
    }

    /// When this call first joined the approval queue
    pub fn queued_at(&self) -> Option<Instant> {
        self.queued_at
    }
}
