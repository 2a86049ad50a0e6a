//! JSON envelopes shared by the ledger API server and its sync client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys owned by the server; never treated as domain fields.
pub const SERVER_MANAGED_FIELDS: [&str; 6] = [
    "id",
    "version",
    "created_at",
    "updated_at",
    "sync_timestamp",
    "client_id",
];

pub fn is_server_managed(key: &str) -> bool {
    SERVER_MANAGED_FIELDS.contains(&key)
}

/// `{success: true, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessBody<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessBody<T> {
    pub const fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// `{success: false, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Version mismatch response sent with HTTP 409.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictBody {
    pub success: bool,
    pub message: String,
    pub conflict: bool,
    pub data: ConflictDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetails {
    pub client_version: Option<i64>,
    pub server_version: i64,
    /// Full stored entity as of the rejected request
    pub current_data: Value,
}

impl ConflictBody {
    pub fn new(details: ConflictDetails) -> Self {
        Self {
            success: false,
            message: format!(
                "Version conflict: entity is at version {}",
                details.server_version
            ),
            conflict: true,
            data: details,
        }
    }
}

/// `GET /healthz` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conflict_body_shape() {
        let body = ConflictBody::new(ConflictDetails {
            client_version: Some(1),
            server_version: 2,
            current_data: json!({ "id": "abc", "version": 2 }),
        });

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "success": false,
                "message": "Version conflict: entity is at version 2",
                "conflict": true,
                "data": {
                    "client_version": 1,
                    "server_version": 2,
                    "current_data": { "id": "abc", "version": 2 }
                }
            })
        );
    }

    #[test]
    fn managed_fields() {
        assert!(is_server_managed("version"));
        assert!(is_server_managed("client_id"));
        assert!(!is_server_managed("name"));
    }
}
