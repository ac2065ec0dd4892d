//! Mapping of upload failures to HTTP responses.

use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};

use crate::UploadError;

/// Caller-supplied function turning the first upload failure into a response.
pub type ErrorResponder = Arc<dyn Fn(&UploadError) -> Response<Bytes> + Send + Sync>;

/// Message placed in the `message` member of the default JSON body.
pub const DEFAULT_ERROR_MESSAGE: &str = "File upload failed";

/// Default responder: HTTP 500 with a JSON body.
///
/// ```json
/// {"status":"error","message":"File upload failed","error":"<error>"}
/// ```
pub fn json_error_response(err: &UploadError) -> Response<Bytes> {
    let body = serde_json::json!({
        "status": "error",
        "message": DEFAULT_ERROR_MESSAGE,
        "error": err.to_string(),
    });

    let mut response = Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Returns [`json_error_response`] as an [`ErrorResponder`].
pub fn default_responder() -> ErrorResponder {
    Arc::new(json_error_response)
}
