//! Ambient HTTP middleware: request id propagation and security headers.
//!
//! Authentication/authorization middleware is out of scope (spec.md §1 —
//! "the HTTP authentication flow" is an explicit non-goal, owned by the
//! REST layer this crate treats as an external collaborator).

pub mod request_tracking;

pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
