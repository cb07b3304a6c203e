//! JSON-RPC 2.0 envelope types for the tool protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcMethod {
    ToolsCall,
    ToolsList,
    ResourcesList,
    ResourcesRead,
}

impl RpcMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolsCall => "tools/call",
            Self::ToolsList => "tools/list",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: RpcMethod, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_owned(),
            method: method.as_str().to_owned(),
            params,
            id,
        }
    }
}

/// A response carries either a `result` or an `error`; a populated `error`
/// is an application-level failure from a reachable backend, distinct from
/// any transport failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Option<u64>,
}

impl RpcResponse {
    pub fn success(result: Value, id: u64) -> Self {
        Self { result: Some(result), error: None, id: Some(id) }
    }

    pub fn failure(code: i64, message: impl Into<String>, id: u64) -> Self {
        Self {
            result: None,
            error: Some(RpcErrorObject { code, message: message.into(), data: None }),
            id: Some(id),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RpcMethod, RpcRequest, RpcResponse};

    #[test]
    fn request_envelope_matches_wire_contract() {
        let request = RpcRequest::new(
            RpcMethod::ToolsCall,
            json!({"name": "deploy_to_azure", "arguments": {"version": "1.2.3"}}),
            7,
        );

        let encoded = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(
            encoded,
            json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": {"name": "deploy_to_azure", "arguments": {"version": "1.2.3"}},
                "id": 7
            })
        );
    }

    #[test]
    fn error_response_decodes_with_optional_data() {
        let response: RpcResponse = serde_json::from_value(json!({
            "error": {"code": -32601, "message": "method not found"},
            "id": 3
        }))
        .expect("decode response");

        let error = response.error.expect("error object");
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "method not found");
        assert!(error.data.is_none());
        assert!(response.result.is_none());
    }
}
