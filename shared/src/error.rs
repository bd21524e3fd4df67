use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error taxonomy for the API surface. Every variant renders as a JSON
/// body with an `error` string; validation failures additionally carry
/// a per-field message map so the caller can highlight the right input.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation failed")]
    Validation(BTreeMap<&'static str, String>),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the error as an HTTP response. Internal detail is logged
    /// server-side and never included in the body.
    pub fn into_response(self) -> Result<Response<Body>, Error> {
        if let ApiError::Internal(detail) = &self {
            tracing::error!("Internal error: {}", detail);
        }

        let body = match &self {
            ApiError::Validation(fields) => serde_json::json!({
                "error": self.to_string(),
                "fields": fields,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        json_response(self.status(), &body)
    }
}

/// Build a JSON response with the standard headers.
pub fn json_response(
    status: StatusCode,
    body: &serde_json::Value,
) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.to_string().into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("Book").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation(BTreeMap::new()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_body_names_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("title", "Title is required".to_string());
        let response = ApiError::Validation(fields).into_response().unwrap();
        assert_eq!(response.status(), 400);

        let body: serde_json::Value =
            serde_json::from_slice(&response.body().to_vec()).unwrap();
        assert_eq!(body["fields"]["title"], "Title is required");
    }

    #[test]
    fn test_internal_body_is_generic() {
        let response = ApiError::Internal("dynamo exploded: table missing".into())
            .into_response()
            .unwrap();
        assert_eq!(response.status(), 500);

        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("Internal server error"));
        assert!(!body.contains("dynamo"));
    }
}
