use serde::{Deserialize, Serialize};

/// Error body returned by the backend (`{"detail": "..."}`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    /// Human readable reason supplied by the backend.
    pub detail: String,
}

impl ApiErrorBody {
    /// Creates an error body with the given detail.
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    /// Extracts the detail from a raw response body, falling back to the body
    /// itself when it is not the backend's JSON error shape.
    #[must_use]
    pub fn detail_or_body(body: &str) -> String {
        serde_json::from_str::<Self>(body).map_or_else(|_| body.trim().to_string(), |err| err.detail)
    }
}

impl std::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail)
    }
}

impl std::error::Error for ApiErrorBody {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test ApiErrorBody creation and display
    #[test]
    fn test_api_error_body_display() {
        let error = ApiErrorBody::new("Invalid credentials.");
        assert_eq!(error.to_string(), "Invalid credentials.");
    }

    /// Test ApiErrorBody deserialization
    #[test]
    fn test_api_error_body_deserialization() {
        let error: ApiErrorBody = serde_json::from_str(r#"{"detail":"User not found. Please sign up."}"#).unwrap();
        assert_eq!(error.detail, "User not found. Please sign up.");
    }

    /// Test detail extraction from JSON and non-JSON bodies
    #[test]
    fn test_detail_or_body() {
        assert_eq!(ApiErrorBody::detail_or_body(r#"{"detail":"nope"}"#), "nope");
        assert_eq!(ApiErrorBody::detail_or_body("Internal Server Error\n"), "Internal Server Error");
        assert_eq!(ApiErrorBody::detail_or_body(""), "");
    }

    /// Test ApiErrorBody as Error trait
    #[test]
    fn test_api_error_body_as_error() {
        let error = ApiErrorBody::new("Error trait test");
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.to_string().contains("Error trait test"));
    }
}
