//! The document-screening pipeline.
//!
//! For each input document: split into page images, OCR each page, classify
//! the extracted text, and check it against the target name. Pages are
//! screened independently — a document may produce several matches, one per
//! page, and we deliberately do not dedupe them.

use std::sync::Arc;

use futures::{FutureExt as _, StreamExt as _};
use schemars::JsonSchema;

use super::work::{WorkInput, WorkOutput, WorkStatus};
use crate::{
    async_utils::{BoxedFuture, BoxedStream, blocking_iter_streams::BlockingIterStream},
    classify::{ClassificationConfig, DocumentType, RuleSet, classify},
    matcher::NameQuery,
    ocr::{OcrPageEngine, OcrPageInput, OcrPageOutput},
    page_iter::{PageIter, PageIterOptions},
    prelude::*,
};

/// An input record describing a file to screen.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ScanInput {
    /// The path to the document (PDF or image).
    pub path: PathBuf,
}

/// A page that was classified and matched the target name.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PageMatch {
    /// The zero-based page index within the source document.
    pub page_index: usize,

    /// The detected document type.
    pub document_type: DocumentType,

    /// The raw OCR text of the page, for the presentation layer.
    pub text: String,
}

/// An output record describing a screened document.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ScanOutput {
    /// The input path.
    pub path: PathBuf,

    /// The number of pages the document has, if we got far enough to count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,

    /// The pages that matched, in page order.
    pub matches: Vec<PageMatch>,
}

/// The pure screening core, bundled up for the pipeline.
///
/// Everything in here is per-invocation configuration; nothing is global.
/// `screen_page` is synchronous and side-effect free, so pages can be
/// screened concurrently without coordination.
pub struct Screener {
    /// The classification rules, in priority order.
    pub rules: RuleSet,

    /// Which document types to report.
    pub config: ClassificationConfig,

    /// The person we are looking for.
    pub query: NameQuery,
}

impl Screener {
    /// Screen one page of OCR text. Returns a match only if the page
    /// classifies as an enabled type AND mentions the target person.
    pub fn screen_page(&self, page_index: usize, text: &str) -> Option<PageMatch> {
        let document_type = classify(text, &self.config, &self.rules);
        if document_type == DocumentType::Unknown {
            return None;
        }
        if !self.query.matches(text) {
            return None;
        }
        Some(PageMatch {
            page_index,
            document_type,
            text: text.to_owned(),
        })
    }
}

/// Screen a stream of documents.
///
/// Returns a stream of futures; resolve them with
/// [`futures::StreamExt::buffered`] to control how many documents are in
/// flight at once.
#[instrument(level = "debug", skip_all)]
pub async fn scan_files(
    input: BoxedStream<Result<WorkInput<ScanInput>>>,
    concurrency_limit: usize,
    engine: Arc<dyn OcrPageEngine>,
    page_iter_opts: PageIterOptions,
    screener: Arc<Screener>,
) -> BoxedStream<BoxedFuture<Result<WorkOutput<ScanOutput>>>> {
    input
        .map(move |scan_input| {
            let page_iter_opts = page_iter_opts.clone();
            let engine = engine.clone();
            let screener = screener.clone();
            async move {
                let scan_input = scan_input?;
                scan_file(scan_input, &page_iter_opts, concurrency_limit, engine, screener)
                    .await
            }
            .boxed()
        })
        .boxed()
}

/// Screen a single document, converting any document-level error into a
/// failed output record so that one corrupt file can't abort the batch.
#[instrument(level = "debug", skip_all, fields(id = %scan_input.id))]
pub async fn scan_file(
    scan_input: WorkInput<ScanInput>,
    page_iter_opts: &PageIterOptions,
    concurrency_limit: usize,
    engine: Arc<dyn OcrPageEngine>,
    screener: Arc<Screener>,
) -> Result<WorkOutput<ScanOutput>> {
    let id = scan_input.id.clone();
    let path = scan_input.data.path.clone();

    let result =
        scan_file_inner(scan_input, page_iter_opts, concurrency_limit, engine, screener)
            .await;
    match result {
        Ok(output) => Ok(output),
        Err(err) => Ok(WorkOutput::new_failed(
            id,
            vec![format!("{:?}", err)],
            ScanOutput {
                path,
                page_count: None,
                matches: vec![],
            },
        )),
    }
}

/// Perform the actual work for [`scan_file`].
async fn scan_file_inner(
    scan_input: WorkInput<ScanInput>,
    page_iter_opts: &PageIterOptions,
    concurrency_limit: usize,
    engine: Arc<dyn OcrPageEngine>,
    screener: Arc<Screener>,
) -> Result<WorkOutput<ScanOutput>> {
    let id = scan_input.id.clone();
    let path = scan_input.data.path;

    // Create a page stream, using BlockingIterStream to avoid blocking the
    // async executor with slow page extraction.
    let page_iter = PageIter::from_path(&path, page_iter_opts)
        .await
        .with_context(|| format!("failed to separate {:?} into pages", path.display()))?;
    let check_complete_result = page_iter.check_complete();
    let warnings = page_iter.warnings().to_owned();
    let page_stream = BlockingIterStream::new(page_iter);

    // OCR all the pages concurrently, up to the concurrency limit. A page
    // whose text can't be extracted becomes an error entry on the output
    // record, not a dead document.
    let page_outputs = page_stream
        .enumerate()
        .map(move |(page_idx, page)| {
            let id = id.clone();
            let engine = engine.clone();
            async move {
                match page {
                    Ok(page) => {
                        match engine.ocr_page(OcrPageInput { id, page_idx, page }).await {
                            Ok(output) => output,
                            Err(err) => OcrPageOutput {
                                text: None,
                                errors: vec![format!(
                                    "text extraction failed for page {}: {:?}",
                                    page_idx, err
                                )],
                            },
                        }
                    }
                    Err(err) => OcrPageOutput {
                        text: None,
                        errors: vec![format!(
                            "failed to load page {}: {:?}",
                            page_idx, err
                        )],
                    },
                }
            }
        })
        .buffered(concurrency_limit)
        .collect::<Vec<_>>()
        .await;

    // Classify and name-match each extracted page. This part is pure and
    // takes microseconds, so there's nothing to parallelize.
    let mut errors = warnings;
    let mut matches = vec![];
    let mut good_page_count = 0;
    let total_page_count = page_outputs.len();
    for (page_idx, page_output) in page_outputs.into_iter().enumerate() {
        errors.extend(page_output.errors);
        if let Some(text) = page_output.text {
            good_page_count += 1;
            if let Some(page_match) = screener.screen_page(page_idx, &text) {
                matches.push(page_match);
            }
        }
    }
    if let Err(err) = &check_complete_result {
        errors.push(err.to_string());
    }

    Ok(WorkOutput {
        id: scan_input.id,
        status: if check_complete_result.is_ok() && good_page_count == total_page_count {
            WorkStatus::Ok
        } else if good_page_count > 0 {
            WorkStatus::Incomplete
        } else {
            WorkStatus::Failed
        },
        errors,
        data: ScanOutput {
            path,
            page_count: Some(total_page_count),
            matches,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use serde_json::json;

    use super::*;

    const IDENTITY_CARD_TEXT: &str =
        "RÉPUBLIQUE FRANÇAISE\nCARTE NATIONALE D'IDENTITÉ\nNom: DUPONT\nPrénom: Jean";

    fn make_screener(surname: &str, given_name: &str) -> Arc<Screener> {
        Arc::new(Screener {
            rules: RuleSet::builtin(),
            config: ClassificationConfig::all(),
            query: NameQuery {
                surname: surname.to_owned(),
                given_name: given_name.to_owned(),
            },
        })
    }

    /// An OCR engine that returns canned text for every page.
    struct FixedTextEngine(&'static str);

    #[async_trait]
    impl OcrPageEngine for FixedTextEngine {
        async fn ocr_page(&self, _input: OcrPageInput) -> Result<OcrPageOutput> {
            Ok(OcrPageOutput {
                text: Some(self.0.to_owned()),
                errors: vec![],
            })
        }
    }

    /// An OCR engine that always fails.
    struct BrokenEngine;

    #[async_trait]
    impl OcrPageEngine for BrokenEngine {
        async fn ocr_page(&self, _input: OcrPageInput) -> Result<OcrPageOutput> {
            Err(anyhow!("service unavailable"))
        }
    }

    fn fake_png() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::with_suffix(".png").unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'])
            .unwrap();
        file.flush().unwrap();
        file
    }

    fn scan_input(path: &Path) -> WorkInput<ScanInput> {
        WorkInput {
            id: json!("doc-1"),
            data: ScanInput {
                path: path.to_owned(),
            },
        }
    }

    #[test]
    fn screen_page_requires_type_and_name() {
        let screener = make_screener("Dupont", "Jean");
        let page_match = screener.screen_page(0, IDENTITY_CARD_TEXT).unwrap();
        assert_eq!(page_match.document_type, DocumentType::IdentityCard);
        assert_eq!(page_match.page_index, 0);

        // Wrong person: classified, but filtered out.
        assert!(screener.screen_page(0, "CARTE NATIONALE D'IDENTITÉ MARTIN Paul").is_none());
        // Right person, but nothing recognizable.
        assert!(screener.screen_page(0, "Jean DUPONT went shopping").is_none());
        // No filter criteria means no matches, not "match everything".
        assert!(make_screener("", "").screen_page(0, IDENTITY_CARD_TEXT).is_none());
    }

    #[tokio::test]
    async fn matching_page_is_emitted() -> Result<()> {
        let file = fake_png();
        let output = scan_file(
            scan_input(file.path()),
            &PageIterOptions {
                rasterize_dpi: 150,
                max_pages: Some(5),
            },
            2,
            Arc::new(FixedTextEngine(IDENTITY_CARD_TEXT)),
            make_screener("Dupont", "Jean"),
        )
        .await?;

        assert_eq!(output.status, WorkStatus::Ok);
        assert_eq!(output.data.page_count, Some(1));
        assert_eq!(output.data.matches.len(), 1);
        assert_eq!(
            output.data.matches[0].document_type,
            DocumentType::IdentityCard
        );
        Ok(())
    }

    #[tokio::test]
    async fn ocr_failure_becomes_a_failed_record() -> Result<()> {
        let file = fake_png();
        let output = scan_file(
            scan_input(file.path()),
            &PageIterOptions {
                rasterize_dpi: 150,
                max_pages: None,
            },
            2,
            Arc::new(BrokenEngine),
            make_screener("Dupont", ""),
        )
        .await?;

        assert_eq!(output.status, WorkStatus::Failed);
        assert!(output.data.matches.is_empty());
        assert!(
            output
                .errors
                .iter()
                .any(|err| err.contains("text extraction failed")),
            "errors were: {:?}",
            output.errors
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_becomes_a_failed_record() -> Result<()> {
        let output = scan_file(
            scan_input(Path::new("/nonexistent/file.pdf")),
            &PageIterOptions {
                rasterize_dpi: 150,
                max_pages: None,
            },
            2,
            Arc::new(FixedTextEngine(IDENTITY_CARD_TEXT)),
            make_screener("Dupont", ""),
        )
        .await?;
        assert_eq!(output.status, WorkStatus::Failed);
        assert!(!output.errors.is_empty());
        Ok(())
    }
}
