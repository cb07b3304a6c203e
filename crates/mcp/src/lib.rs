//! Multi-endpoint JSON-RPC tool client
//!
//! This crate speaks a generic JSON-RPC 2.0 tool protocol to a set of
//! named backends (`tools/call`, `tools/list`, `resources/list`,
//! `resources/read`):
//! - **Protocol** (`protocol`) - request/response envelope types
//! - **Registry** (`registry`) - logical backend name -> endpoint URL,
//!   plus operation-category affinity for picking a backend
//! - **Client** (`client`) - per-call retry with linear backoff, error
//!   classification, batch calls, and health probing
//! - **Transport** (`transport`) - the HTTP seam; `reqwest` in production,
//!   scripted doubles in tests
//!
//! Backends are opaque: the client never interprets tool results beyond
//! the envelope. Calls are at-most-once per attempt; there is no
//! exactly-once guarantee.

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use client::{BackendHealth, BatchOutcome, HealthStatus, McpClient, RetryPolicy, ToolCall};
pub use error::McpError;
pub use protocol::{RpcErrorObject, RpcMethod, RpcRequest, RpcResponse};
pub use registry::EndpointRegistry;
pub use transport::{ReqwestTransport, RpcTransport, TransportFailure};
