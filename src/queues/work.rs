//! Input and output records for stream processing.
//!
//! Every subcommand reads a stream of input records (each with a caller
//! assigned `id`), and writes a stream of output records that carry that `id`
//! plus a status and any accumulated errors. Failures are data: a document
//! that can't be processed becomes a `failed` record in the output, and only
//! the overall failure _rate_ can fail the run. See [`StreamOpts`] in
//! [`crate::cmd`] for the knob.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::{
    async_utils::{BoxedStream, io::read_jsonl_or_csv},
    cmd::StreamOpts,
    prelude::*,
    ui::Ui,
};

/// An input record, parsed from a line of JSONL or a CSV row.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkInput<T>
where
    T: 'static,
{
    /// The unique ID of the work item.
    pub id: Value,

    /// The input data for the work item.
    #[serde(flatten)]
    pub data: T,
}

impl<T> WorkInput<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Convert from a JSON value to the input type.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value::<Self>(value).context("failed to deserialize input")
    }

    /// Read a stream from a [`Path`] or from standard input.
    pub async fn read_stream(
        ui: Ui,
        path: Option<&Path>,
    ) -> Result<BoxedStream<Result<Self>>> {
        Ok(read_jsonl_or_csv(ui, path)
            .await?
            .map(|value| Self::from_json(value?))
            .boxed())
    }
}

/// Output status of a work item.
#[derive(Clone, Copy, Debug, JsonSchema, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// The work item was successful.
    Ok,

    /// Partial data.
    Incomplete,

    /// The work item failed.
    Failed,
}

/// An output record.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct WorkOutput<T>
where
    T: 'static,
{
    /// The unique ID of the work item.
    pub id: Value,

    /// What is the status of this work item?
    pub status: WorkStatus,

    /// Any errors that occurred during processing.
    pub errors: Vec<String>,

    /// The output data for the work item.
    #[serde(flatten)]
    pub data: T,
}

impl<T> WorkOutput<T>
where
    T: Clone + Serialize + Send + 'static,
{
    /// Create a new failed output record.
    pub fn new_failed(id: Value, errors: Vec<String>, data: T) -> Self {
        Self {
            id,
            status: WorkStatus::Failed,
            errors,
            data,
        }
    }

    /// Convert from the output type to a JSON value.
    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value::<Self>((*self).to_owned())
            .context("failed to serialize output")
    }

    /// Write a stream of outputs to a [`Path`] or to standard output.
    pub async fn write_stream(
        ui: &Ui,
        path: Option<&Path>,
        stream: BoxedStream<Result<Self>>,
        stream_opts: &StreamOpts,
    ) -> Result<()> {
        let (stream, counters) = WorkOutputCounters::wrap_stream(stream);
        let output = stream
            .map(|value| {
                let value = value?;
                value.to_json()
            })
            .boxed();
        crate::async_utils::io::write_output(path, output).await?;
        counters.finish(ui, stream_opts)
    }
}

/// Counters accumulated over a stream of output records.
#[derive(Clone, Debug, Default)]
pub struct WorkOutputCounters {
    /// How many records did we process?
    pub total_record_count: usize,

    /// How many records did we fail to process?
    pub failure_count: usize,

    /// How many non-fatal errors did we encounter?
    pub non_fatal_error_count: usize,
}

impl WorkOutputCounters {
    /// Wrap a stream with counters.
    pub fn wrap_stream<T>(
        stream: BoxedStream<Result<WorkOutput<T>>>,
    ) -> (
        BoxedStream<Result<WorkOutput<T>>>,
        Arc<Mutex<WorkOutputCounters>>,
    ) {
        let counters = Arc::new(Mutex::new(Self::default()));
        let counters_clone = counters.clone();
        let stream = stream
            .map(move |value| {
                let value = value?;
                counters_clone.update(&value);
                Ok(value)
            })
            .boxed();
        (stream, counters)
    }
}

/// We actually want to put methods on `Mutex<WorkOutputCounters>`, because
/// that's the type we work with. To do that, we need an extension trait.
pub trait WorkItemCounterExt {
    /// Update counters for a work item.
    fn update<T>(&self, item: &WorkOutput<T>);

    /// Display counter values to the user, and enforce the allowed failure
    /// rate.
    fn finish(self: Arc<Self>, ui: &Ui, stream_opts: &StreamOpts) -> Result<()>;
}

impl WorkItemCounterExt for Mutex<WorkOutputCounters> {
    fn update<T>(&self, item: &WorkOutput<T>) {
        // Hold a sync lock, but just for an instant to update counters.
        let mut counters = self.lock().expect("lock poisoned");
        counters.total_record_count += 1;
        if item.status == WorkStatus::Failed {
            counters.failure_count += 1;
        } else if !item.errors.is_empty() {
            counters.non_fatal_error_count += item.errors.len();
        }
    }

    fn finish(self: Arc<Self>, ui: &Ui, stream_opts: &StreamOpts) -> Result<()> {
        let counters = self.lock().expect("lock poisoned").to_owned();
        if counters.total_record_count == 0 {
            return Ok(());
        }
        let failure_rate =
            counters.failure_count as f32 / counters.total_record_count as f32;
        if failure_rate > stream_opts.allowed_failure_rate {
            Err(anyhow!(
                "{}/{} ({:.2}%) of outputs were failures, but only {:.2}% were allowed",
                counters.failure_count,
                counters.total_record_count,
                failure_rate * 100.0,
                stream_opts.allowed_failure_rate * 100.0
            ))
        } else {
            if counters.non_fatal_error_count > 0 {
                ui.display_message(
                    "⚠️",
                    &format!(
                        "{} non-fatal errors encountered",
                        counters.non_fatal_error_count
                    ),
                );
            }
            if counters.failure_count > 0 {
                ui.display_message(
                    "❌",
                    &format!("{} records could not be processed", counters.failure_count),
                );
            }
            Ok(())
        }
    }
}
