//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;
use tokio::io::AsyncWriteExt as _;

use crate::{
    async_utils::io::create_writer,
    classify::RuleSet,
    prelude::*,
    queues::{
        classify::{ClassifyInput, ClassifyOutput},
        scan::{ScanInput, ScanOutput},
        work::{WorkInput, WorkOutput},
    },
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// Scan input records.
    ScanInput,
    /// Scan output records.
    ScanOutput,
    /// Classify input records.
    ClassifyInput,
    /// Classify output records.
    ClassifyOutput,
    /// Classification rule sets (for `--rules`).
    RuleSet,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    // Get our schema.
    let schema = match schema_opts.schema_type {
        SchemaType::ScanInput => schema_for!(WorkInput<ScanInput>),
        SchemaType::ScanOutput => schema_for!(WorkOutput<ScanOutput>),
        SchemaType::ClassifyInput => schema_for!(WorkInput<ClassifyInput>),
        SchemaType::ClassifyOutput => schema_for!(WorkOutput<ClassifyOutput>),
        SchemaType::RuleSet => schema_for!(RuleSet),
    };

    // Write out our schema.
    let mut wtr = create_writer(schema_opts.output_path.as_deref()).await?;
    let schema_str =
        serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    wtr.write_all(schema_str.as_bytes())
        .await
        .context("failed to write schema")?;
    wtr.flush().await.context("failed to flush schema")?;
    Ok(())
}
