//! The `scan` subcommand.

use std::sync::Arc;

use clap::Args;
use futures::{Stream as _, StreamExt as _};

use super::StreamOpts;
use crate::{
    classify::{ClassificationConfig, DocumentType, RuleSet},
    matcher::NameQuery,
    ocr::{OcrOpts, engine_for_opts},
    page_iter::PageIterOptions,
    prelude::*,
    queues::{
        scan::{ScanInput, Screener, scan_files},
        work::{WorkInput, WorkOutput},
    },
    ui::{ProgressConfig, Ui},
};

/// Scan command line arguments.
#[derive(Debug, Args)]
pub struct ScanOpts {
    /// Input file (JSONL or CSV) with `id` and `path` fields. Defaults to
    /// standard input.
    pub input_path: Option<PathBuf>,

    /// The target surname to screen for.
    #[clap(long)]
    pub surname: Option<String>,

    /// The target given name to screen for.
    #[clap(long)]
    pub given_name: Option<String>,

    /// Document types to look for, comma-separated. Defaults to all types.
    #[clap(long = "types", value_enum, value_delimiter = ',')]
    pub document_types: Vec<DocumentType>,

    /// Load an alternative classification rule set from a TOML or JSON file.
    #[clap(long)]
    pub rules: Option<PathBuf>,

    #[clap(flatten)]
    pub page_iter_opts: PageIterOptions,

    #[clap(flatten)]
    pub ocr_opts: OcrOpts,

    #[clap(flatten)]
    pub stream_opts: StreamOpts,

    /// The output path (JSONL). Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `scan` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_scan(ui: Ui, opts: &ScanOpts) -> Result<()> {
    // Assemble the pure screening core from our configuration.
    let rules = match &opts.rules {
        Some(path) => RuleSet::load(path).await?,
        None => RuleSet::builtin(),
    };
    debug!(version = %rules.version, "Using rule set");
    let config = if opts.document_types.is_empty() {
        ClassificationConfig::all()
    } else {
        ClassificationConfig::from_types(&opts.document_types)
    };
    let query = NameQuery::new(opts.surname.as_deref(), opts.given_name.as_deref());
    if query.is_empty() {
        warn!(
            "neither --surname nor --given-name was given, so no page can match; \
             use `classify` for classification-only runs"
        );
    }
    let screener = Arc::new(Screener {
        rules,
        config,
        query,
    });

    // Create the OCR engine.
    let engine = engine_for_opts(&opts.ocr_opts)?;

    // Open up our input stream and parse into records.
    let input =
        WorkInput::<ScanInput>::read_stream(ui.clone(), opts.input_path.as_deref())
            .await?;
    let input = opts.stream_opts.apply_stream_input_opts(input);

    // Configure our progress bar.
    let pb = ui.new_from_size_hint(
        &ProgressConfig {
            emoji: "📄",
            msg: "Screening documents",
            done_msg: "Screened documents",
        },
        input.size_hint(),
    );

    // Screen the documents concurrently, and write the results.
    let stream = scan_files(
        input,
        opts.stream_opts.job_count,
        engine,
        opts.page_iter_opts.clone(),
        screener,
    )
    .await;
    let output = pb
        .wrap_stream(stream.buffered(opts.stream_opts.job_count))
        .boxed();
    WorkOutput::write_stream(&ui, opts.output_path.as_deref(), output, &opts.stream_opts)
        .await
}
