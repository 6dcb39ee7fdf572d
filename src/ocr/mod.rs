//! OCR engine interface.
//!
//! We treat OCR as an opaque collaborator: a page image goes in, plain text
//! comes out. The text is allowed to be noisy; the classifier and name
//! matcher are built for that. Engine failures are the orchestration layer's
//! problem, never the classifier's.

use std::sync::Arc;

use clap::{Args, ValueEnum};

use crate::{page_iter::Page, prelude::*, rate_limit::RateLimit};

pub mod ocrspace;
pub mod tesseract;

/// The OCR backends we support.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum EngineKind {
    /// The hosted ocr.space HTTP API.
    #[default]
    #[clap(name = "ocrspace")]
    OcrSpace,

    /// A locally installed `tesseract` binary.
    Tesseract,
}

/// OCR-related command-line options.
#[derive(Args, Clone, Debug)]
pub struct OcrOpts {
    /// The OCR engine to use.
    #[clap(long, value_enum, default_value_t = EngineKind::default())]
    pub engine: EngineKind,

    /// The OCR language hint. Defaults to French, in the code convention of
    /// the selected engine ("fre" for ocrspace, "fra" for tesseract).
    #[clap(long)]
    pub language: Option<String>,

    /// A timeout, in seconds, for a single OCR request.
    #[clap(long, default_value = "90")]
    pub timeout: u64,

    /// A rate limit for OCR API requests, of the form "10/s" or "50/m".
    /// Only applies to hosted engines.
    #[clap(long, default_value = "50/m")]
    pub rate_limit: Option<RateLimit>,
}

/// A page handed to an OCR engine.
pub struct OcrPageInput {
    /// The ID of the source document.
    pub id: Value,

    /// The index of the page within the document.
    pub page_idx: usize,

    /// The page image.
    pub page: Page,
}

/// The result of OCRing a single page.
pub struct OcrPageOutput {
    /// The extracted text, if OCR succeeded for this page.
    pub text: Option<String>,

    /// Any non-fatal errors that occurred along the way.
    pub errors: Vec<String>,
}

/// Interface to an OCR engine.
#[async_trait]
pub trait OcrPageEngine: Send + Sync + 'static {
    /// OCR a single page.
    async fn ocr_page(&self, input: OcrPageInput) -> Result<OcrPageOutput>;
}

/// Instantiate the OCR engine selected by `opts`.
pub fn engine_for_opts(opts: &OcrOpts) -> Result<Arc<dyn OcrPageEngine>> {
    match opts.engine {
        EngineKind::OcrSpace => Ok(Arc::new(ocrspace::OcrSpaceEngine::new(opts)?)),
        EngineKind::Tesseract => Ok(Arc::new(tesseract::TesseractEngine::new(opts)?)),
    }
}
