use crate::import::ImportError;
use crate::validation::ValidationError;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

#[derive(Debug)]
pub enum ApiError {
    DatabaseError(sqlx::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

/// JSON body returned for every error status.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                Status::InternalServerError
            }
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Conflict(_) => Status::Conflict,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let (error_type, message) = match self {
            ApiError::DatabaseError(e) => {
                log::error!("database error: {}", e);
                ("DatabaseError", "A database error occurred".to_string())
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                ("NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                ("BadRequest", msg)
            }
            ApiError::Conflict(msg) => {
                log::info!("conflict: {}", msg);
                ("Conflict", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                ("InternalError", msg)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response)
            .unwrap_or_else(|_| r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Malformed input or idempotency key"),
            ("404", "Resource not found"),
            ("409", "Idempotency key is already being processed"),
            ("500", "Internal failure; details are only logged"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::InProgress { token, .. } => ApiError::Conflict(format!(
                "Import with idempotency key '{token}' is already in progress"
            )),
            other => {
                log::error!("import failed: {}", other);
                ApiError::InternalError("Import failed; no records were written".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn import_errors_map_to_statuses() {
        let conflict = ApiError::from(ImportError::InProgress {
            token: "T1".into(),
            job_id: Uuid::new_v4(),
        });
        assert_eq!(conflict.status(), Status::Conflict);

        let storage = ApiError::from(ImportError::Storage(sqlx::Error::PoolTimedOut));
        assert_eq!(storage.status(), Status::InternalServerError);
        match storage {
            ApiError::InternalError(msg) => assert!(!msg.contains("pool")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = ApiError::from(ValidationError::BatchSize {
            actual: 0,
            max: 10,
        });
        assert_eq!(err.status(), Status::BadRequest);
    }

    #[test]
    fn row_not_found_is_not_found() {
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).status(),
            Status::NotFound
        );
    }
}
