//! OCR engine wrapping the `tesseract` CLI tool.

use std::{
    fs::{File, read_to_string},
    io::Write as _,
};

use tokio::process::Command;

use super::{OcrOpts, OcrPageEngine, OcrPageInput, OcrPageOutput};
use crate::{async_utils::check_for_command_failure, prelude::*};

/// The default OCR language, in tesseract's three-letter convention.
const DEFAULT_LANGUAGE: &str = "fra";

/// An OCR engine that shells out to a locally installed `tesseract`.
pub struct TesseractEngine {
    /// The tesseract language code.
    language: String,
}

impl TesseractEngine {
    /// Create a new `tesseract` engine.
    pub fn new(opts: &OcrOpts) -> Result<Self> {
        Ok(Self {
            language: opts
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned()),
        })
    }
}

#[async_trait]
impl OcrPageEngine for TesseractEngine {
    #[instrument(level = "debug", skip_all, fields(id = %input.id, page = %input.page_idx))]
    async fn ocr_page(&self, input: OcrPageInput) -> Result<OcrPageOutput> {
        let extension = mime_guess::get_mime_extensions_str(&input.page.mime_type)
            .and_then(|extensions| extensions.first())
            .ok_or_else(|| {
                anyhow!("cannot determine extension for {}", input.page.mime_type)
            })?;

        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join(format!("input.{}", extension));
        let output_path = tmpdir.path().join("output.txt");
        let mut input_file =
            File::create(&input_path).context("cannot create tesseract input file")?;
        input_file
            .write_all(&input.page.data)
            .context("cannot write tesseract input file")?;
        input_file
            .flush()
            .context("cannot flush tesseract input file")?;

        // Run tesseract on the input file.
        let output = Command::new("tesseract")
            .arg(&input_path)
            .arg(output_path.with_extension(""))
            .arg("-l")
            .arg(&self.language)
            .output()
            .await
            .context("cannot run tesseract")?;
        check_for_command_failure("tesseract", &output, None)?;

        // Read the output file.
        let text =
            read_to_string(&output_path).context("cannot read tesseract output file")?;
        Ok(OcrPageOutput {
            text: Some(text),
            errors: vec![],
        })
    }
}
