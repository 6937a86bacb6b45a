//! Document decoding boundary.
//!
//! The viewer only needs three capabilities from a page engine: open a
//! document from bytes, report its pages, and paint one page at a given
//! scale. [`PdfEngine`] captures exactly that; [`LopdfEngine`] is the default
//! backend.

use image::{ImageBuffer, Rgba};
use lopdf::Document;
use std::collections::HashMap;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };
const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const EDGE: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// Pixel dimensions of the page painted at `scale`, never below 1x1.
    pub fn scaled(self, scale: f32) -> (u32, u32) {
        let scale = if scale <= 0.0 { 1.0 } else { scale };
        (
            (self.width_pt * scale).round().max(1.0) as u32,
            (self.height_pt * scale).round().max(1.0) as u32,
        )
    }
}

/// `page_index` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

impl PdfEngineError {
    /// Errors caused by the input bytes rather than by the engine state.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::EncryptedUnsupported | Self::Backend(_))
    }
}

pub trait PdfEngine {
    fn open(&mut self, bytes: Vec<u8>) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    /// Frees everything held for `handle`.
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug)]
struct OpenDocument {
    byte_len: usize,
    page_sizes: Vec<PageSize>,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, OpenDocument>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_documents(&self) -> usize {
        self.docs.len()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let mut sizes = Vec::new();

        for (_, object_id) in doc.get_pages() {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|bounds| {
                    let [x0, y0, x1, y1] = bounds.as_slice() else {
                        return None;
                    };
                    let (x0, y0) = (x0.as_float().ok()?, y0.as_float().ok()?);
                    let (x1, y1) = (x1.as_float().ok()?, y1.as_float().ok()?);
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(DEFAULT_PAGE_SIZE);

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn document(&self, handle: DocumentHandle) -> Result<&OpenDocument, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, bytes: Vec<u8>) -> Result<DocumentHandle, PdfEngineError> {
        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        log::debug!("opened document {} with {} pages", handle.raw(), page_sizes.len());
        self.docs.insert(handle, OpenDocument { byte_len: bytes.len(), page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.document(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let doc = self.document(handle)?;
        doc.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: doc.page_sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let (width, height) = self.page_size(handle, request.page_index)?.scaled(request.scale);
        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, EDGE);
                image.put_pixel(x, height - 1, EDGE);
            }
            for y in 0..height {
                image.put_pixel(0, y, EDGE);
                image.put_pixel(width - 1, y, EDGE);
            }
        }

        Ok(image)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        let doc = self.docs.remove(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))?;
        log::debug!("released document {} ({} bytes)", handle.raw(), doc.byte_len);
        Ok(())
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(fixtures::blank_pdf(3)).expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 3);
    }

    #[test]
    fn render_matches_scaled_page_size() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(fixtures::pdf_with_page_sizes(&[(600, 800), (300, 400)]))
            .expect("open should succeed");

        let image = engine
            .render_page(handle, RenderRequest { page_index: 1, scale: 1.5 })
            .expect("page should render");

        assert_eq!((image.width(), image.height()), (450, 600));
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(fixtures::blank_pdf(2)).expect("open should succeed");

        let err = engine
            .render_page(handle, RenderRequest { page_index: 2, scale: 1.0 })
            .expect_err("page 2 is out of range");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 2, page_count: 2 }));
    }

    #[test]
    fn close_releases_the_document() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(fixtures::blank_pdf(1)).expect("open should succeed");
        assert_eq!(engine.open_documents(), 1);

        engine.close(handle).expect("close should succeed");
        assert_eq!(engine.open_documents(), 0);
        assert!(matches!(engine.page_count(handle), Err(PdfEngineError::InvalidHandle(_))));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let mut engine = LopdfEngine::new();
        let err = engine.open(b"definitely not a pdf".to_vec()).expect_err("should fail");

        assert!(err.is_malformed_input());
        assert_eq!(engine.open_documents(), 0);
    }

    #[test]
    fn encrypted_marker_is_rejected() {
        let mut engine = LopdfEngine::new();
        let err = engine.open(b"%PDF-1.4\n/Encrypt 5 0 R".to_vec()).expect_err("should fail");

        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }
}
