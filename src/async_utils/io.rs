//! I/O utilities.
//!
//! Input records arrive as JSONL or CSV, from a file or from standard input,
//! and we detect which format we're looking at from the filename or the first
//! byte. Output is always JSONL, to a file or standard output. Configuration
//! files (rule sets) may be TOML or JSON.

use std::{pin::Pin, sync::Arc, task::Context, vec};

use futures::{TryStreamExt, pin_mut, stream::StreamExt as _};
use peekable::tokio::AsyncPeekable;
use serde_json::Map;
use tokio::{
    fs::File,
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt as _, AsyncWrite,
        AsyncWriteExt as _, BufReader, BufWriter, ReadBuf,
    },
};
use tokio_stream::wrappers::LinesStream;

use super::{BoxedStream, size_hint::WithSizeHintExt};
use crate::{
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// An async reader that knows whether its input looks like JSON/JSONL or
/// something else (for us, CSV).
///
/// For files we trust the extension; for standard input we peek at the first
/// byte and treat `{` as JSON-like.
pub struct FormatSniffingReader {
    /// Do we expect our input to be JSON or JSONL?
    is_json_like: bool,

    /// A human-readable description of the input source, for error messages.
    description: String,

    /// Our reader. Pinned because async readers hold pointers into it.
    reader: Pin<Box<dyn AsyncBufRead + Unpin + Send + Sync + 'static>>,
}

impl FormatSniffingReader {
    /// Create a reader from an existing stream, peeking to detect the format.
    pub async fn new_from_reader(
        description: String,
        reader: impl AsyncRead + Unpin + Send + Sync + 'static,
    ) -> Result<Self> {
        let reader = BufReader::new(reader);
        let mut peekable = AsyncPeekable::new(Box::new(reader));
        let mut buffer = vec![0; 1];
        peekable.peek_exact(&mut buffer).await?;
        Ok(Self {
            is_json_like: buffer[0] == b'{',
            description,
            reader: Box::pin(BufReader::new(peekable)),
        })
    }

    /// Create a reader from a [`Path`].
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().unwrap_or_default();
        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open file at path: {:?}", path))?;
        Ok(Self {
            is_json_like: ext == "json" || ext == "jsonl",
            description: path.to_string_lossy().into_owned(),
            reader: Box::pin(BufReader::new(file)),
        })
    }

    /// Create a reader from either a [`Path`] or standard input.
    pub async fn new_from_path_or_stdin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::new_from_path(path).await,
            None => Self::new_from_reader("stdin".to_owned(), tokio::io::stdin()).await,
        }
    }

    /// Is our input JSON-like?
    pub fn is_json_like(&self) -> bool {
        self.is_json_like
    }
}

impl AsyncRead for FormatSniffingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        Pin::get_mut(self).reader.as_mut().poll_read(cx, buf)
    }
}

impl AsyncBufRead for FormatSniffingReader {
    fn poll_fill_buf(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> std::task::Poll<std::io::Result<&[u8]>> {
        Pin::get_mut(self).reader.as_mut().poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::get_mut(self).reader.as_mut().consume(amt)
    }
}

/// Read TOML or JSON from a file, depending on what the file contains.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut reader = FormatSniffingReader::new_from_path(path).await?;
    let mut data = String::new();
    // Read all at once because our parsing libraries don't do async I/O.
    reader
        .read_to_string(&mut data)
        .await
        .with_context(|| format!("failed to read file at path: {:?}", path))?;
    if reader.is_json_like() {
        serde_json::from_str(&data).with_context(|| {
            format!("failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Count JSONL or CSV records in a file, for progress-bar totals.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn count_jsonl_or_csv_records(
    ui: &Ui,
    path: &Path,
) -> Result<(usize, Option<usize>)> {
    // If this isn't a regular file (say, a named pipe), we can't count
    // records without consuming them.
    if !path.is_file() {
        return Ok((0, None));
    }

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🧮",
        msg: "Counting input records",
        done_msg: "Counted input records",
    });

    let reader = FormatSniffingReader::new_from_path_or_stdin(Some(path)).await?;
    let count = if reader.is_json_like() {
        LinesStream::new(reader.lines())
            .try_fold(0, |acc, _line| async move { Ok(acc + 1) })
            .await?
    } else {
        csv_async::AsyncReaderBuilder::new()
            .create_reader(reader)
            .into_byte_records()
            .try_fold(0, |acc, _record| async move { Ok(acc + 1) })
            .await?
    };
    spinner.finish_with_message(format!("Found {count} records"));
    Ok((count, Some(count)))
}

/// A JSON Object value, without the surrounding [`Value::Object`] wrapper.
pub type JsonObject = Map<String, Value>;

/// A stream of [`serde_json::Value`] values.
pub type JsonStream = BoxedStream<Result<Value>>;

/// Read JSONL or CSV from a file or stdin, as a stream of JSON objects.
///
/// CSV rows become objects keyed by the header row, with every value a
/// string; downstream deserialization sorts out the types.
pub async fn read_jsonl_or_csv(ui: Ui, path: Option<&Path>) -> Result<JsonStream> {
    let size_hint = match path {
        Some(path) => count_jsonl_or_csv_records(&ui, path).await?,
        None => (0, None),
    };

    let reader = FormatSniffingReader::new_from_path_or_stdin(path).await?;
    let description = Arc::new(reader.description.clone());
    if reader.is_json_like() {
        let lines = LinesStream::new(reader.lines()).with_size_hint(size_hint);
        Ok(Box::pin(lines.then(move |line| {
            let description = description.clone();
            async move {
                let line = line?;
                serde_json::from_str::<Value>(&line).with_context(|| {
                    format!(
                        "failed to parse JSON from line in {:?}: {:?}",
                        description, line
                    )
                })
            }
        })))
    } else {
        let mut reader = csv_async::AsyncReaderBuilder::new().create_reader(reader);
        let headers = Arc::new(
            reader
                .headers()
                .await
                .with_context(|| {
                    format!("failed to read CSV headers from {:?}", description)
                })?
                .to_owned(),
        );
        Ok(Box::pin(
            reader
                .into_records()
                .with_size_hint(size_hint)
                .then(move |record| {
                    let description = description.clone();
                    let headers = headers.clone();
                    async move {
                        let record = record.with_context(|| {
                            format!("failed to read CSV record from {:?}", description)
                        })?;
                        let map: JsonObject = headers
                            .iter()
                            .zip(record.iter())
                            .map(|(header, value)| {
                                (header.to_owned(), Value::String(value.to_owned()))
                            })
                            .collect();
                        Ok(Value::Object(map))
                    }
                }),
        ))
    }
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a stream of JSON values as JSONL, to a file or standard output.
pub async fn write_output(path: Option<&Path>, stream: JsonStream) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    pin_mut!(stream);
    while let Some(value) = stream.next().await {
        let value = value?;
        let json = serde_json::to_string(&value)
            .with_context(|| format!("failed to serialize JSON value: {:?}", value))?;
        writer
            .write_all(json.as_bytes())
            .await
            .context("failed to write JSON to output")?;
        writer
            .write_all(b"\n")
            .await
            .context("failed to write newline to output")?;
    }
    writer.flush().await.context("failed to flush output")?;
    Ok(())
}
