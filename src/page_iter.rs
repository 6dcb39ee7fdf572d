//! Iterate over the pages of a scanned document as images.
//!
//! Single images (PNG, JPEG, BMP, TIFF) pass through as one page. PDFs are
//! rasterized to one PNG per page with Poppler's `pdftocairo`, since the OCR
//! backends want images. Anything else is rejected before any OCR happens.

use std::{collections::BTreeMap, fs, process::Output, sync::LazyLock, vec};

use clap::Args;
use regex::Regex;
use tokio::process::Command;

use crate::{
    async_utils::check_for_command_failure, cpu_limit::with_cpu_semaphore, prelude::*,
};

/// Image types we hand to the OCR backend as-is.
const SUPPORTED_IMAGE_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/bmp", "image/tiff"];

/// Poppler tools report some recoverable conditions as "errors" on stderr.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line of `pdftocairo` output indicate a real failure?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// A page image ready for OCR.
#[derive(Debug)]
pub struct Page {
    /// The MIME type of `data`. One of [`SUPPORTED_IMAGE_TYPES`].
    pub mime_type: String,

    /// The image bytes.
    pub data: Vec<u8>,
}

/// Options for constructing a [`PageIter`].
#[derive(Args, Clone, Debug)]
pub struct PageIterOptions {
    /// The DPI to use when rasterizing PDF pages.
    #[clap(long, default_value = "150")]
    pub rasterize_dpi: u32,

    /// The maximum number of pages to OCR per document. Extra pages are
    /// skipped and recorded as an error on the output record.
    #[clap(long, default_value = "5")]
    pub max_pages: Option<usize>,
}

/// An iterator over the page images of a document, in page order.
pub struct PageIter {
    /// Holds rasterized pages for PDF inputs. Released by [`Drop`].
    #[allow(dead_code)]
    tmpdir: Option<tempfile::TempDir>,

    /// The MIME type of every page we yield.
    mime_type: String,

    /// The page files, sorted into page order.
    file_iter: vec::IntoIter<PathBuf>,

    /// How many pages the document actually has.
    total_pages: usize,

    /// The page cap we were constructed with, if any.
    max_pages: Option<usize>,

    /// Non-fatal complaints from the rasterizer.
    warnings: Vec<String>,
}

impl PageIter {
    /// Create a [`PageIter`] for a file, based on its detected MIME type.
    ///
    /// Unsupported formats are rejected here, before any pages are produced
    /// or any OCR quota is spent.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn from_path(path: &Path, options: &PageIterOptions) -> Result<Self> {
        let mime_type = get_mime_type(path)?;
        if SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            Ok(Self {
                tmpdir: None,
                mime_type,
                file_iter: vec![path.to_owned()].into_iter(),
                total_pages: 1,
                max_pages: options.max_pages,
                warnings: vec![],
            })
        } else if mime_type == "application/pdf" {
            Self::from_rasterized_pdf(path, options).await
        } else {
            Err(anyhow!(
                "unsupported MIME type {} for {:?} (supported: PNG, JPEG, BMP, TIFF, PDF)",
                mime_type,
                path.display()
            ))
        }
    }

    /// Rasterize a PDF into one PNG per page with `pdftocairo`.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    async fn from_rasterized_pdf(path: &Path, options: &PageIterOptions) -> Result<Self> {
        let total_pages = get_pdf_page_count(path).await?;

        // pdftocairo appends page digits to this name when the PDF has more
        // than one page.
        let filename = path
            .file_name()
            .context("failed to get filename from PDF path")?;
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        let out_path = tmpdir.path().join(filename).with_extension("png");

        let mut cmd = Command::new("pdftocairo");
        cmd.arg("-png")
            .arg("-r")
            .arg(options.rasterize_dpi.to_string());
        if let Some(max_pages) = options.max_pages
            && total_pages > max_pages
        {
            // 1-based, inclusive last page.
            cmd.arg("-l").arg(max_pages.to_string());
        }

        // pdftocairo will happily use an entire CPU core, so don't start an
        // unbounded number of copies.
        let output = with_cpu_semaphore(|| async {
            cmd.arg(path).arg(&out_path).output().await.with_context(|| {
                format!("failed to run pdftocairo on {:?}", path.display())
            })
        })
        .await?;
        check_for_command_failure("pdftocairo", &output, Some(&is_error_line))?;

        // Collect the rendered pages. Lexical order is page order, because
        // pdftocairo zero-pads the page digits.
        let mut page_paths = tmpdir
            .path()
            .read_dir()
            .with_context(|| {
                format!("failed to read temporary directory {:?}", tmpdir.path())
            })?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<Vec<_>>>()?;
        page_paths.sort();

        Ok(Self {
            tmpdir: Some(tmpdir),
            mime_type: "image/png".to_owned(),
            file_iter: page_paths.into_iter(),
            total_pages,
            max_pages: options.max_pages,
            warnings: collect_command_warnings(&output),
        })
    }

    /// Non-fatal complaints from the rasterizer.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Will this iterator stop before the document's last page?
    pub fn is_incomplete(&self) -> bool {
        self.max_pages
            .is_some_and(|max_pages| self.total_pages > max_pages)
    }

    /// Error if this iterator will only return some of the pages.
    pub fn check_complete(&self) -> Result<()> {
        if self.is_incomplete() {
            Err(anyhow!(
                "only {}/{} pages processed (because of --max-pages)",
                self.max_pages.expect("max_pages should be set"),
                self.total_pages
            ))
        } else {
            Ok(())
        }
    }
}

impl Iterator for PageIter {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.file_iter.next()?;
        let result = fs::read(&path)
            .with_context(|| format!("failed to read page file {:?}", path.display()));
        let data = match result {
            Ok(data) => data,
            Err(err) => return Some(Err(err)),
        };

        // Rasterized pages can be large; reclaim the disk space early.
        if self.tmpdir.is_some()
            && let Err(err) = fs::remove_file(&path)
        {
            warn!(path = %path.display(), "failed to delete page file: {}", err);
        }

        Some(Ok(Page {
            mime_type: self.mime_type.clone(),
            data,
        }))
    }
}

impl Drop for PageIter {
    fn drop(&mut self) {
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

/// Get the number of pages in a PDF file using `pdfinfo`.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))?;
    check_for_command_failure("pdfinfo", &output, None)?;

    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key.to_owned(), value.to_owned());
    }

    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str.parse::<usize>().with_context(|| {
        format!(
            "failed to parse page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}

/// Save any command output as warnings on the page iterator.
fn collect_command_warnings(output: &Output) -> Vec<String> {
    let mut warnings = vec![];
    for raw in [&output.stdout, &output.stderr] {
        let text = String::from_utf8_lossy(raw);
        for line in text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                warnings.push(line.to_owned());
            }
        }
    }
    warnings
}

/// Get the MIME type of a file from its content.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    /// The 8-byte PNG signature, enough for content-based type detection.
    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("error: something went wrong"));
        assert!(is_error_line("ERROR: something went wrong"));
        assert!(!is_error_line("Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }

    #[tokio::test]
    async fn image_files_become_a_single_page() -> Result<()> {
        let mut file = tempfile::NamedTempFile::with_suffix(".png")?;
        file.write_all(PNG_MAGIC)?;
        file.flush()?;

        let page_iter = PageIter::from_path(
            file.path(),
            &PageIterOptions {
                rasterize_dpi: 150,
                max_pages: Some(5),
            },
        )
        .await?;
        assert!(!page_iter.is_incomplete());
        let pages = page_iter.collect::<Result<Vec<_>>>()?;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/png");
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_formats_are_rejected() -> Result<()> {
        let mut file = tempfile::NamedTempFile::with_suffix(".bin")?;
        // A ZIP archive signature.
        file.write_all(b"PK\x03\x04")?;
        file.flush()?;

        let result = PageIter::from_path(
            file.path(),
            &PageIterOptions {
                rasterize_dpi: 150,
                max_pages: None,
            },
        )
        .await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn pdf_page_count_works() -> Result<()> {
        let page_count =
            get_pdf_page_count(Path::new("tests/fixtures/two_pages.pdf")).await?;
        assert_eq!(page_count, 2);
        Ok(())
    }
}
