//! The response envelope returned by every routed operation.

use serde::{Deserialize, Serialize};

/// Error codes carried on failure responses. Only meaningful when
/// `success == false`.
pub mod codes {
    /// Malformed request: bad payload, bad path parameter, missing uri.
    pub const BAD_REQUEST: i32 = 400;
    /// Unknown route or unknown entity id.
    pub const NOT_FOUND: i32 = 404;
    /// Handler failure surfaced at the routing boundary.
    pub const INTERNAL: i32 = 500;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub error_code: i32,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn ok_with(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: code,
            error_message: Some(message.into()),
            data: None,
        }
    }
}
