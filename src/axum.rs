//! Axum integration helpers.
//!
//! ```ignore
//! let route = mux.route("avatars", ["avatar"])?;
//! let app = Router::new()
//!     .route("/upload", post(handler))
//!     .layer(middleware::from_fn_with_state(route, upload_middleware::<MemoryStorage>));
//! ```

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::{stream, Stream, StreamExt};

use crate::{
    context::{attach, uploaded_files},
    ContextError, ParseError, Storage, UploadError, UploadRoute, UploadedFiles,
};

/// Axum body stream mapped into `filemux` chunk errors.
pub type AxumBodyStream<S> =
    stream::Map<S, fn(Result<Bytes, axum::Error>) -> Result<Bytes, UploadError>>;

/// Middleware for [`axum::middleware::from_fn_with_state`].
///
/// Runs the route's upload before the inner service. On success the
/// [`UploadedFiles`] are merged into the request extensions together with the
/// plain [`FormValues`](crate::FormValues); the inner service receives an
/// empty body. On failure the route's error responder answers and the inner
/// service is not called.
pub async fn upload_middleware<S>(
    State(route): State<UploadRoute<S>>,
    request: Request,
    next: Next,
) -> Response
where
    S: Storage,
{
    let (mut parts, body) = request.into_parts();

    let content_type = match content_type_from_headers(&parts.headers) {
        Ok(value) => value.to_owned(),
        Err(err) => return error_response(&route, &err),
    };

    if let (Some(limit), Some(length)) = (
        route.mux().config().limits.max_body_size,
        content_length(&parts.headers),
    ) {
        if length > limit {
            return error_response(&route, &UploadError::FileSizeExceeded { limit });
        }
    }

    let body = Box::pin(map_body_stream(body.into_data_stream()));
    let form = match route.mux().parse_form(&content_type, body).await {
        Ok(form) => form,
        Err(err) => return error_response(&route, &err),
    };

    let files = match route.process(&form).await {
        Ok(files) => files,
        Err(err) => return error_response(&route, &err),
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        bucket = route.bucket(),
        files = files.total_files(),
        "axum: upload complete"
    );

    attach(&mut parts.extensions, files);
    parts.extensions.insert(form.values().clone());

    next.run(Request::from_parts(parts, Body::empty())).await
}

fn error_response<S>(route: &UploadRoute<S>, err: &UploadError) -> Response
where
    S: Storage,
{
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %err, field_name = ?err.field(), "axum: upload rejected");

    route.mux().respond(err).map(Body::from).into_response()
}

/// Extractor for every file uploaded by an earlier [`upload_middleware`].
#[derive(Debug, Clone)]
pub struct Uploads(pub UploadedFiles);

/// Rejection returned when no upload results are available.
#[derive(Debug)]
pub struct UploadsRejection(pub ContextError);

impl IntoResponse for UploadsRejection {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
    }
}

#[async_trait::async_trait]
impl<AppState> FromRequestParts<AppState> for Uploads
where
    AppState: Send + Sync,
{
    type Rejection = UploadsRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        uploaded_files(&parts.extensions)
            .map(|files| Self(files.clone()))
            .map_err(UploadsRejection)
    }
}

/// Extracts the raw `Content-Type` header from Axum request headers.
pub fn content_type_from_headers(headers: &HeaderMap) -> Result<&str, UploadError> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .ok_or_else(|| ParseError::new("missing Content-Type header"))?;
    value
        .to_str()
        .map_err(|_| ParseError::new("Content-Type header must be ASCII").into())
}

/// Maps an Axum body stream into the stream shape expected by `filemux`.
pub fn map_body_stream<S>(stream: S) -> AxumBodyStream<S>
where
    S: Stream<Item = Result<Bytes, axum::Error>>,
{
    stream.map(axum_item_to_upload as fn(_) -> _)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn axum_item_to_upload(item: Result<Bytes, axum::Error>) -> Result<Bytes, UploadError> {
    item.map_err(|err| ParseError::new(format!("axum body stream error: {err}")).into())
}
