use thiserror::Error;

/// Errors surfaced by the RPC client, classified so callers can tell
/// configuration problems, transport failures, remote status failures, and
/// application-level errors apart. Transport variants name the endpoint
/// they were talking to; none of them carry raw backtraces.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum McpError {
    #[error("backend `{server}` is not configured")]
    NotConfigured { server: String },
    #[error("no backends are configured")]
    NoServersConfigured,
    #[error("could not connect to backend endpoint {endpoint}")]
    ConnectionRefused { endpoint: String },
    #[error("timed out waiting for backend endpoint {endpoint}")]
    Timeout { endpoint: String },
    #[error("name resolution failed for backend endpoint {endpoint}")]
    NameResolution { endpoint: String },
    #[error("backend endpoint was not found (404): {endpoint}")]
    NotFound { endpoint: String },
    #[error("backend server error ({status}) at {endpoint}")]
    ServerStatus { status: u16, endpoint: String },
    #[error("backend rejected the request ({status}) at {endpoint}")]
    ClientStatus { status: u16, endpoint: String },
    #[error("backend rate limited requests at {endpoint}")]
    RateLimited { endpoint: String },
    #[error("backend returned an application error (code {code}): {message}")]
    Application { code: i64, message: String },
    #[error("unexpected backend failure at {endpoint}: {detail}")]
    Other { endpoint: String, detail: String },
}

impl McpError {
    /// Application errors come from a reachable, responding backend; they
    /// are never retried.
    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }
}
