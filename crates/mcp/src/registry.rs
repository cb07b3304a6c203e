//! Endpoint registry - logical backend names mapped to endpoint URLs.
//!
//! The registry is plain data handed to a client at construction. A name
//! with no configured target fails fast at lookup time; no network attempt
//! is ever made for an unconfigured backend.

use std::collections::BTreeMap;

use crate::error::McpError;

/// Backends the assistant knows how to talk to. Probing reports a
/// not-configured status for any of these missing from the registry.
pub const KNOWN_BACKENDS: [&str; 4] =
    ["deploy-service", "work-tracker", "local-devops", "desktop-commander"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<String, String>,
}

impl EndpointRegistry {
    pub fn new(endpoints: BTreeMap<String, String>) -> Self {
        Self { endpoints }
    }

    pub fn endpoint(&self, backend: &str) -> Option<&str> {
        self.endpoints.get(backend).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn configured_backends(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Configured-or-not flag for every known backend, in declaration
    /// order.
    pub fn server_statuses(&self) -> Vec<(&'static str, bool)> {
        KNOWN_BACKENDS
            .into_iter()
            .map(|backend| (backend, self.endpoints.contains_key(backend)))
            .collect()
    }

    /// Map a coarse operation category to the preferred backend, falling
    /// back to the first configured backend when the preferred one is not
    /// registered.
    pub fn detect_best_server(&self, category: &str) -> Result<&str, McpError> {
        if let Some(preferred) = preferred_backend(category) {
            if let Some((backend, _)) = self.endpoints.get_key_value(preferred) {
                return Ok(backend);
            }
        }

        self.endpoints
            .keys()
            .next()
            .map(String::as_str)
            .ok_or(McpError::NoServersConfigured)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for EndpointRegistry {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self::new(
            entries
                .into_iter()
                .map(|(backend, url)| (backend.to_owned(), url.to_owned()))
                .collect(),
        )
    }
}

/// Static affinity rules: which backend family usually serves a category
/// of operation. Accepts both intent kind names and looser category words.
fn preferred_backend(category: &str) -> Option<&'static str> {
    match category {
        "deploy" | "pipeline" | "pipeline_status" | "resource_check" => Some("deploy-service"),
        "work_item" | "create_work_item" | "pull_request" | "repository" => Some("work-tracker"),
        "docker" | "kubernetes" | "git" | "git_operations" | "shell" | "command" => {
            Some("local-devops")
        }
        "powershell" | "service" | "system" | "system_command" => Some("desktop-commander"),
        _ => None,
    }
}
