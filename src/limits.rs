use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use pin_project::pin_project;

use crate::{ConfigError, UploadError};

/// Byte budgets enforced while a multipart request is read.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Limits {
    /// Maximum request body size in bytes.
    pub max_body_size: Option<u64>,
    /// File parts larger than this are buffered in a temporary file instead
    /// of memory. `None` keeps every part in memory.
    pub max_memory_part_size: Option<u64>,
}

impl Limits {
    /// Creates an empty limits configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum request body size.
    pub fn max_body_size(mut self, bytes: u64) -> Self {
        self.max_body_size = Some(bytes);
        self
    }

    /// Sets the in-memory threshold for file parts.
    pub fn max_memory_part_size(mut self, bytes: u64) -> Self {
        self.max_memory_part_size = Some(bytes);
        self
    }

    /// Rejects zero-valued limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_size == Some(0) {
            return Err(ConfigError::InvalidLimitValue {
                limit: "max_body_size",
            });
        }
        if self.max_memory_part_size == Some(0) {
            return Err(ConfigError::InvalidLimitValue {
                limit: "max_memory_part_size",
            });
        }
        Ok(())
    }
}

/// Stream adapter that fails once more than `limit` bytes have passed through.
///
/// The overflowing chunk is never forwarded. After the error the stream ends.
#[pin_project]
#[derive(Debug)]
pub struct BodyLimit<S> {
    #[pin]
    inner: S,
    limit: Option<u64>,
    seen: u64,
    exhausted: bool,
}

impl<S> BodyLimit<S> {
    /// Wraps `inner`; a `None` limit passes everything through.
    pub fn new(inner: S, limit: Option<u64>) -> Self {
        Self {
            inner,
            limit,
            seen: 0,
            exhausted: false,
        }
    }

    /// Number of bytes forwarded so far.
    pub fn bytes_seen(&self) -> u64 {
        self.seen
    }
}

impl<S> Stream for BodyLimit<S>
where
    S: Stream<Item = Result<Bytes, UploadError>>,
{
    type Item = Result<Bytes, UploadError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.exhausted {
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let seen = this.seen.saturating_add(chunk.len() as u64);
                if let Some(limit) = *this.limit {
                    if seen > limit {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(limit = limit, seen = seen, "limits: body size exceeded");
                        *this.exhausted = true;
                        return Poll::Ready(Some(Err(UploadError::FileSizeExceeded { limit })));
                    }
                }
                *this.seen = seen;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                *this.exhausted = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                *this.exhausted = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
