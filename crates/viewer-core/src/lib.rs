//! Lazy paginated document viewer with resumable reading position.
//!
//! [`ViewerController`] opens a stored document, restores the last page read,
//! paints pages only as they approach the viewport, and writes the reader's
//! position back to the library as they scroll.

pub mod config;
pub mod controller;
pub mod layout;
pub mod lazy_page;
pub mod render_queue;
pub mod tracker;

pub use config::{fit_width_scale, ConfigError, ViewerConfig, ZoomMode, MAX_SCALE, MIN_SCALE};
pub use controller::{ViewerController, ViewerEvent, ViewerPhase};
pub use layout::{Intersection, ScrollLayout};
pub use lazy_page::{LazyPage, PageState, Placeholder};
pub use render_queue::{RenderJob, RenderPriority, RenderQueue, RenderTicket};
pub use tracker::{PageChange, ViewportTracker};

use doc_model::DocumentId;
use doc_store::StoreError;
use pdf_engine::PdfEngineError;

/// What went wrong, without the payload; cheap to copy into state and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StorageUnavailable,
    NotFound,
    DecodeFailure,
    RenderFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("document storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
    #[error("document {0} not found")]
    NotFound(DocumentId),
    #[error("document could not be decoded: {0}")]
    DecodeFailure(#[source] PdfEngineError),
    #[error("page {page} failed to render: {source}")]
    RenderFailure {
        page: u32,
        #[source]
        source: PdfEngineError,
    },
    #[error("no document is open")]
    NotOpen,
    #[error("{0:?} errors cannot be retried")]
    NotRetryable(ErrorKind),
}

impl ViewerError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::StorageUnavailable(_) => Some(ErrorKind::StorageUnavailable),
            Self::NotFound(_) => Some(ErrorKind::NotFound),
            Self::DecodeFailure(_) => Some(ErrorKind::DecodeFailure),
            Self::RenderFailure { .. } => Some(ErrorKind::RenderFailure),
            Self::NotOpen | Self::NotRetryable(_) => None,
        }
    }
}

impl From<StoreError> for ViewerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::StorageUnavailable(other),
        }
    }
}
