//! Lazy result streams.

use bson::Document;
use futures::{Stream, StreamExt, TryStreamExt};
use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    backend::DocumentStream,
    document::{Record, RecordExt},
    error::DocumentStoreResult,
};

/// A stream of documents returned by `find` and `aggregate`.
///
/// Nothing is buffered beyond what the backend produced; polling drives the
/// underlying backend stream. Use [`Cursor::try_collect_all`] to drain it into a vector.
pub struct Cursor {
    inner: DocumentStream,
}

impl Cursor {
    pub fn new(inner: DocumentStream) -> Self {
        Cursor { inner }
    }

    /// Drains the cursor, stopping at the first error.
    pub async fn try_collect_all(self) -> DocumentStoreResult<Vec<Document>> {
        self.inner.try_collect().await
    }

    /// Drains the cursor, converting every document into a record.
    pub async fn try_collect_records<R: Record>(self) -> DocumentStoreResult<Vec<R>> {
        self.inner
            .and_then(|document| async move { R::from_document(document) })
            .try_collect()
            .await
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

impl Stream for Cursor {
    type Item = DocumentStoreResult<Document>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
