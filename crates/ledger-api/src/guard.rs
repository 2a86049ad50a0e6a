//! Request-time version check for updates.

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::versioning::strip_managed;

/// A client wrote against a version the server no longer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionConflict {
    pub client_version: i64,
    pub server_version: i64,
}

/// Compare the client's version with the stored one.
///
/// Requests without a version are legacy callers and pass unchecked.
pub const fn check(client_version: Option<i64>, stored_version: i64) -> Result<(), VersionConflict> {
    match client_version {
        Some(client_version) if client_version != stored_version => Err(VersionConflict {
            client_version,
            server_version: stored_version,
        }),
        _ => Ok(()),
    }
}

/// JSON write body split into version metadata and domain fields.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedBody {
    pub id: Option<String>,
    pub client_version: Option<i64>,
    pub client_id: Option<String>,
    pub sync_timestamp: Option<String>,
    /// Domain fields only; server-managed keys removed
    pub fields: Map<String, Value>,
}

impl VersionedBody {
    pub fn parse(value: Value) -> Result<Self, AppError> {
        let Value::Object(mut object) = value else {
            return Err(AppError::bad_request("request body must be a JSON object"));
        };

        let client_version = match object.remove("version") {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => Some(
                number
                    .as_i64()
                    .ok_or_else(|| AppError::bad_request("version must be an integer"))?,
            ),
            Some(_) => return Err(AppError::bad_request("version must be an integer")),
        };

        let id = optional_string(&mut object, "id")?;
        let client_id = optional_string(&mut object, "client_id")?;
        let sync_timestamp = optional_string(&mut object, "sync_timestamp")?;

        Ok(Self {
            id,
            client_version,
            client_id,
            sync_timestamp,
            fields: strip_managed(object),
        })
    }
}

fn optional_string(object: &mut Map<String, Value>, key: &str) -> Result<Option<String>, AppError> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(AppError::bad_request(format!("{key} must be a string"))),
    }
}

impl<S: Send + Sync> FromRequest<S> for VersionedBody {
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(request, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_version_passes() {
        assert_eq!(check(None, 4), Ok(()));
    }

    #[test]
    fn matching_version_passes() {
        assert_eq!(check(Some(4), 4), Ok(()));
    }

    #[test]
    fn stale_or_future_version_conflicts() {
        assert_eq!(
            check(Some(3), 4),
            Err(VersionConflict {
                client_version: 3,
                server_version: 4,
            })
        );
        assert!(check(Some(5), 4).is_err());
    }

    #[test]
    fn parse_splits_metadata_from_fields() {
        let body = VersionedBody::parse(json!({
            "id": "0190c0de-0000-7000-8000-000000000001",
            "version": 2,
            "client_id": "device-1",
            "sync_timestamp": "2026-03-14T09:00:00Z",
            "updated_at": "ignored",
            "name": "Acme"
        }))
        .unwrap();

        assert_eq!(body.client_version, Some(2));
        assert_eq!(body.client_id.as_deref(), Some("device-1"));
        assert_eq!(body.id.as_deref(), Some("0190c0de-0000-7000-8000-000000000001"));
        assert_eq!(Value::Object(body.fields), json!({ "name": "Acme" }));
    }

    #[test]
    fn parse_treats_null_version_as_absent() {
        let body = VersionedBody::parse(json!({ "version": null, "name": "Acme" })).unwrap();
        assert_eq!(body.client_version, None);
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(matches!(
            VersionedBody::parse(json!({ "version": "2" })),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            VersionedBody::parse(json!({ "version": 1.5 })),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            VersionedBody::parse(json!([1, 2])),
            Err(AppError::BadRequest(_))
        ));
    }
}
