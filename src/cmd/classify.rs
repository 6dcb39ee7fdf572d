//! The `classify` subcommand.

use std::sync::Arc;

use clap::Args;
use futures::{Stream as _, StreamExt as _};

use super::StreamOpts;
use crate::{
    classify::{ClassificationConfig, DocumentType, RuleSet},
    matcher::NameQuery,
    prelude::*,
    queues::{
        classify::{ClassifyContext, ClassifyInput, process_classify_stream},
        work::{WorkInput, WorkOutput},
    },
    ui::{ProgressConfig, Ui},
};

/// Classify command line arguments.
#[derive(Debug, Args)]
pub struct ClassifyOpts {
    /// Input file (JSONL or CSV) with `id` and `text` fields. Defaults to
    /// standard input.
    pub input_path: Option<PathBuf>,

    /// The target surname to match, if any.
    #[clap(long)]
    pub surname: Option<String>,

    /// The target given name to match, if any.
    #[clap(long)]
    pub given_name: Option<String>,

    /// Document types to look for, comma-separated. Defaults to all types.
    #[clap(long = "types", value_enum, value_delimiter = ',')]
    pub document_types: Vec<DocumentType>,

    /// Load an alternative classification rule set from a TOML or JSON file.
    #[clap(long)]
    pub rules: Option<PathBuf>,

    #[clap(flatten)]
    pub stream_opts: StreamOpts,

    /// The output path (JSONL). Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `classify` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_classify(ui: Ui, opts: &ClassifyOpts) -> Result<()> {
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
    let context = Arc::new(ClassifyContext {
        rules,
        config,
        query: NameQuery::new(opts.surname.as_deref(), opts.given_name.as_deref()),
    });

    // Open up our input stream and parse into records.
    let input =
        WorkInput::<ClassifyInput>::read_stream(ui.clone(), opts.input_path.as_deref())
            .await?;
    let input = opts.stream_opts.apply_stream_input_opts(input);

    // Configure our progress bar.
    let pb = ui.new_from_size_hint(
        &ProgressConfig {
            emoji: "🔎",
            msg: "Classifying texts",
            done_msg: "Classified texts",
        },
        input.size_hint(),
    );

    let output = pb.wrap_stream(process_classify_stream(input, context)).boxed();
    WorkOutput::write_stream(&ui, opts.output_path.as_deref(), output, &opts.stream_opts)
        .await
}
