//! NATS message types

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::defaults::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

/// Payload for requests without parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// Limit/offset pagination shared by the list requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIST_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    /// Clamp to sane bounds before the values reach SQL
    pub fn normalized(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_LIST_LIMIT),
            offset: self.offset.max(0),
        }
    }

    pub fn has_more(&self, total: i64) -> bool {
        self.offset + self.limit < total
    }
}

/// List response with pagination info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
            has_more: page.has_more(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_when_missing() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page.limit, 50);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn test_page_normalized_clamps_limit_and_offset() {
        let page = Page { limit: 0, offset: -5 }.normalized();
        assert_eq!(page.limit, 1);
        assert_eq!(page.offset, 0);

        let page = Page { limit: 100_000, offset: 10 }.normalized();
        assert_eq!(page.limit, MAX_LIST_LIMIT);
        assert_eq!(page.offset, 10);
    }

    #[test]
    fn test_page_has_more() {
        let page = Page { limit: 50, offset: 0 };
        assert!(page.has_more(51));
        assert!(!page.has_more(50));

        let page = Page { limit: 10, offset: 40 };
        assert!(!page.has_more(50));
        assert!(page.has_more(51));
    }

    #[test]
    fn test_list_response_serializes_has_more_camel_case() {
        let response = ListResponse::new(vec![1, 2], 3, Page { limit: 2, offset: 0 });
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"hasMore\":true"));
        assert!(json.contains("\"total\":3"));
    }

    #[test]
    fn test_error_response_with_details() {
        let error = ErrorResponse::new(Uuid::nil(), "PARSE_ERROR", "bad csv")
            .with_details(serde_json::json!({ "row": "general" }));
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("PARSE_ERROR"));
        assert!(json.contains("\"row\":\"general\""));
    }

    #[test]
    fn test_empty_payload_accepts_empty_object() {
        let request: Request<EmptyPayload> = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","timestamp":"2024-01-01T00:00:00Z","payload":{}}"#,
        ).unwrap();
        assert!(request.id.is_nil());
    }
}
