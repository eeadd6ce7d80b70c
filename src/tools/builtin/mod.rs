//! Builtin tools
//!
//! Each tool has its own module with pure helpers separated from I/O. The
//! HTTP-backed tools never fail an execution: errors come back as
//! `"An error occurred: ..."` strings the agent can read.

use serde_json::Value;
use std::fmt::Display;

pub mod arxiv;
pub mod human_input;
pub mod openapi_request;

pub use arxiv::{ArxivSearchParams, ArxivSearchTool};
pub use human_input::{HumanInputParams, HumanInputTool, EXIT_SENTINEL, TERMINATE_SENTINEL};
pub use openapi_request::{HttpMethod, OpenApiRequest, OpenApiRequestTool};

/// Render a failure as the string result handed back to the agent
pub fn error_result(error: impl Display) -> Value {
    Value::String(format!("An error occurred: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_result_format() {
        assert_eq!(
            error_result("connection refused"),
            Value::String("An error occurred: connection refused".to_string())
        );
    }
}
