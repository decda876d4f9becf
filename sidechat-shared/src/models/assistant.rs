use serde::{Deserialize, Serialize};

/// Question sent to the AI assistant endpoints.
///
/// `chat_context` carries a plain-text transcript of the conversation so the
/// assistant can answer within it. The backend expects the camelCase name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AskAiRequest {
    pub question: String,
    #[serde(rename = "chatContext", default)]
    pub chat_context: String,
}

impl AskAiRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            chat_context: String::new(),
        }
    }

    /// Attaches a conversation transcript.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.chat_context = context.into();
        self
    }
}

/// Body of the non-streaming `/ask-ai` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskAiResponse {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_ai_request_uses_camel_case_context() {
        let request = AskAiRequest::new("what changed?").with_context("Ada: shipped it");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["question"], "what changed?");
        assert_eq!(json["chatContext"], "Ada: shipped it");
        assert!(json.get("chat_context").is_none());
    }

    #[test]
    fn test_ask_ai_request_context_is_optional() {
        let request: AskAiRequest = serde_json::from_str(r#"{"question":"hi"}"#).unwrap();
        assert_eq!(request.chat_context, "");
    }
}
