// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method registry and request dispatch.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use serde_json::Value;
use tomo_guard::{method_tier, AuditEvent, AuditSink, PermissionTier};
use tomo_wire::{Request, Response, RpcError};

/// What a handler returns.
pub type HandlerResult = Result<Value, RpcError>;

type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A registered method handler.
pub type Handler = Arc<dyn Fn(Option<Value>) -> BoxFuture + Send + Sync>;

/// Routes requests to handlers, enforcing permission tiers.
pub struct Dispatcher {
    methods: HashMap<String, Handler>,
    allowed: BTreeSet<PermissionTier>,
    audit: Arc<dyn AuditSink>,
}

impl Dispatcher {
    /// A dispatcher for a channel permitting `allowed` tiers.
    pub fn new(allowed: impl IntoIterator<Item = PermissionTier>, audit: Arc<dyn AuditSink>) -> Self {
        Self { methods: HashMap::new(), allowed: allowed.into_iter().collect(), audit }
    }

    /// Register one method.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |params| Box::pin(handler(params))));
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Handle one request. `None` means nothing goes back on the wire
    /// (the request was a notification).
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let is_notification = request.is_notification();
        let id = request.id.clone();

        let outcome = self.dispatch(&request).await;

        match outcome {
            Ok(result) => (!is_notification).then(|| Response::ok(id, result)),
            Err(error) => {
                self.audit.record(AuditEvent::RpcError {
                    method: request.method.clone(),
                    code: error.code,
                    message: error.message.clone(),
                });
                if is_notification {
                    tracing::warn!(method = %request.method, %error, "notification failed");
                    None
                } else {
                    Some(Response::fail(id, error))
                }
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> HandlerResult {
        if request.method.is_empty() {
            return Err(RpcError::invalid_request("Missing method"));
        }

        let Some(handler) = self.methods.get(&request.method) else {
            return Err(RpcError::method_not_found(&request.method));
        };

        let required = method_tier(&request.method);
        if !self.allowed.contains(&required) {
            tracing::warn!(
                method = %request.method,
                required = %required,
                "permission denied for method"
            );
            return Err(RpcError::permission_denied(&required.to_string()));
        }

        handler(request.params.clone()).await
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
