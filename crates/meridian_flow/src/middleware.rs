//! Transport middleware adapter.
//!
//! Route-bound flows can sit in front of an HTTP-like transport. The
//! [`MiddlewareChain`] walks the route-bound flows in registration order,
//! runs the first one whose `can_activate` passes, and maps its outcome to a
//! [`TransportResponse`]. The engine itself never touches a socket.

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use serde_json::{Value, json};

use crate::context::StateBag;
use crate::flow::FlowAccess;
use crate::instance::{FlowInstance, FlowOutcome};

/// A transport-neutral request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportRequest {
    /// Request method, e.g. `POST`.
    pub method: String,
    /// Request path, e.g. `/tools/call`.
    pub path: String,
    /// Headers with lower-cased names.
    pub headers: HashMap<String, String>,
    /// Parsed request body; becomes the flow input.
    pub body: Value,
}

impl TransportRequest {
    /// Creates a request with no headers and a null body.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Value::Null,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Returns a header value, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase().as_str())
            .map(String::as_str)
    }
}

/// Extra predicate on a route.
pub type RouteGuard = Arc<dyn Fn(&TransportRequest) -> bool + Send + Sync>;

/// Method and path filter binding a flow to the transport.
#[derive(Clone)]
pub struct MiddlewareRoute {
    method: Option<String>,
    path: String,
    guards: Vec<RouteGuard>,
}

impl MiddlewareRoute {
    /// Matches any method on `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            method: None,
            path: path.into(),
            guards: Vec::new(),
        }
    }

    /// Restricts the route to one method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Adds a guard. All guards must pass.
    #[must_use]
    pub fn with_guard(
        mut self,
        guard: impl Fn(&TransportRequest) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// Returns the route path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if method, path and every guard accept `request`.
    #[must_use]
    pub fn matches(&self, request: &TransportRequest) -> bool {
        self.method
            .as_deref()
            .is_none_or(|method| method.eq_ignore_ascii_case(&request.method))
            && self.path == request.path
            && self.guards.iter().all(|guard| guard(request))
    }
}

impl fmt::Debug for MiddlewareRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRoute")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("guards", &self.guards.len())
            .finish()
    }
}

/// What the transport should do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportResponse {
    /// Answer with this status and optional JSON body.
    Reply {
        /// HTTP status.
        status: u16,
        /// JSON body, if any.
        body: Option<Value>,
    },
    /// A hook already answered; send nothing.
    Handled,
    /// No flow claimed the request; pass it on.
    Unmatched,
}

impl TransportResponse {
    fn json(status: u16, body: Value) -> Self {
        Self::Reply {
            status,
            body: Some(body),
        }
    }

    fn internal_error() -> Self {
        Self::json(500, json!({ "error": "Internal Server Error" }))
    }
}

/// Route-bound flows in registration order.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    instances: Vec<Arc<FlowInstance>>,
}

impl MiddlewareChain {
    pub(crate) fn new(instances: Vec<Arc<FlowInstance>>) -> Self {
        Self { instances }
    }

    /// Returns the number of route-bound flows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if no flow is route-bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Dispatches `request` to the first flow that accepts it.
    ///
    /// Each candidate runs with its own fork of `deps`, so a candidate that
    /// passes with [`FlowSignal::Next`](crate::signal::FlowSignal::Next)
    /// leaves no state behind for the next one.
    pub async fn dispatch(&self, request: TransportRequest, deps: StateBag) -> TransportResponse {
        for instance in &self.instances {
            if !instance.can_activate(&request) {
                continue;
            }

            if instance.access() == FlowAccess::Authorized
                && request.header("authorization").is_none()
            {
                return TransportResponse::json(401, json!({ "error": "Unauthorized" }));
            }

            let outcome = instance.run(request.body.clone(), deps.clone()).await;
            match outcome {
                Ok(FlowOutcome::Responded(body) | FlowOutcome::Completed(Some(body))) => {
                    return TransportResponse::json(200, body);
                }
                Ok(FlowOutcome::Completed(None)) => {
                    return TransportResponse::Reply {
                        status: 204,
                        body: None,
                    };
                }
                Ok(FlowOutcome::Aborted(reason) | FlowOutcome::Failed(reason)) => {
                    tracing::warn!(
                        flow = instance.name(),
                        reason = reason.as_deref().unwrap_or("unspecified"),
                        "flow stopped the request"
                    );
                    return TransportResponse::internal_error();
                }
                Ok(FlowOutcome::Handled) => return TransportResponse::Handled,
                Ok(FlowOutcome::NoMatch) => {
                    tracing::trace!(flow = instance.name(), "flow passed request on");
                }
                Err(error) => {
                    return TransportResponse::json(
                        error.status_code(),
                        json!({ "error": error.public_message(), "code": error.code() }),
                    );
                }
            }
        }
        TransportResponse::Unmatched
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.instances.iter().map(|i| i.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_matches_method_path_and_guards() {
        let route = MiddlewareRoute::new("/tools/call")
            .with_method("POST")
            .with_guard(|req| req.header("x-client").is_some());

        let ok = TransportRequest::new("post", "/tools/call").with_header("X-Client", "cli");
        assert!(route.matches(&ok));

        assert!(!route.matches(&TransportRequest::new("POST", "/tools/call")));
        assert!(!route.matches(&TransportRequest::new("GET", "/tools/call").with_header("x-client", "a")));
        assert!(!route.matches(&TransportRequest::new("POST", "/other").with_header("x-client", "a")));
    }

    #[test]
    fn any_method_route() {
        let route = MiddlewareRoute::new("/health");
        assert!(route.matches(&TransportRequest::new("GET", "/health")));
        assert!(route.matches(&TransportRequest::new("DELETE", "/health")));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = TransportRequest::new("GET", "/").with_header("Authorization", "Bearer t");
        assert_eq!(req.header("AUTHORIZATION"), Some("Bearer t"));
    }
}
