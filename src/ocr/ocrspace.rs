//! OCR engine backed by the hosted ocr.space HTTP API.
//!
//! We POST each page image as a Base64 `data:` URL form field and get JSON
//! back. The free tier meters requests aggressively, so calls go through an
//! optional leaky-bucket rate limiter, and transient HTTP failures are
//! retried with exponential backoff.

use std::{env, time::Duration};

use keen_retry::{ExponentialJitter, ResolvedResult, RetryResult};
use leaky_bucket::RateLimiter;

use super::{OcrOpts, OcrPageEngine, OcrPageInput, OcrPageOutput};
use crate::{
    data_url::data_url,
    prelude::*,
    retry::{
        IsKnownTransient, retry_result_fatal, retry_result_ok, retry_result_transient,
        try_fatal, try_potentially_transient,
    },
};

/// The default API endpoint. Override with `OCR_SPACE_API_BASE`.
const DEFAULT_API_BASE: &str = "https://api.ocr.space/parse/image";

/// The service's public demo key. Fine for smoke tests, useless for real
/// volume.
const DEMO_API_KEY: &str = "helloworld";

/// The default OCR language, in ocr.space's three-letter convention.
const DEFAULT_LANGUAGE: &str = "fre";

/// An OCR engine wrapping the ocr.space API.
pub struct OcrSpaceEngine {
    /// Our HTTP client.
    client: reqwest::Client,

    /// The parse endpoint URL.
    endpoint: String,

    /// Our API key.
    api_key: String,

    /// The OCR language code.
    language: String,

    /// Request throttle, if configured.
    limiter: Option<RateLimiter>,
}

impl OcrSpaceEngine {
    /// Create a new engine from our CLI options and environment.
    pub fn new(opts: &OcrOpts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(opts.timeout))
            .build()
            .context("failed to build HTTP client")?;
        let api_key = match env::var("OCR_SPACE_API_KEY") {
            Ok(key) => key,
            Err(_) => {
                warn!("OCR_SPACE_API_KEY not set, falling back to the demo key");
                DEMO_API_KEY.to_owned()
            }
        };
        Ok(Self {
            client,
            endpoint: env::var("OCR_SPACE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_owned()),
            api_key,
            language: opts
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned()),
            limiter: opts
                .rate_limit
                .as_ref()
                .map(|rate_limit| rate_limit.to_rate_limiter()),
        })
    }

    /// Make one parse request, classifying failures as transient or fatal.
    async fn parse_image(
        &self,
        image_data_url: &str,
    ) -> RetryResult<(), (), String, anyhow::Error> {
        // Wait for the rate limiter _inside_ the retried block, so backoff
        // and throttling compose instead of racing.
        if let Some(limiter) = &self.limiter {
            limiter.acquire_one().await;
        }

        let params = [
            ("apikey", self.api_key.as_str()),
            ("language", self.language.as_str()),
            ("isOverlayRequired", "false"),
            ("base64Image", image_data_url),
        ];
        let response = try_potentially_transient!(
            self.client.post(&self.endpoint).form(&params).send().await
        );

        let status = response.status();
        if !status.is_success() {
            let error = anyhow!("OCR service returned HTTP {}", status);
            return if status.is_known_transient() {
                debug!("Potentially transient error: {:?}", error);
                retry_result_transient(error)
            } else {
                retry_result_fatal(error)
            };
        }

        let parsed = try_fatal!(
            response
                .json::<ParseResponse>()
                .await
                .context("failed to parse OCR service response")
        );
        if parsed.is_errored_on_processing {
            return retry_result_fatal(anyhow!(
                "OCR service reported an error: {}",
                format_error_message(parsed.error_message)
            ));
        }
        match parsed.parsed_results.unwrap_or_default().into_iter().next() {
            Some(result) => retry_result_ok(result.parsed_text),
            None => retry_result_fatal(anyhow!("OCR service returned no parsed results")),
        }
    }
}

#[async_trait]
impl OcrPageEngine for OcrSpaceEngine {
    #[instrument(level = "debug", skip_all, fields(id = %input.id, page = %input.page_idx))]
    async fn ocr_page(&self, input: OcrPageInput) -> Result<OcrPageOutput> {
        let image_data_url = data_url(&input.page.mime_type, &input.page.data);

        // If we have a transient failure, back off exponentially.
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis: 1..=30_000,
            re_attempts: 5,
            jitter_ratio: 0.2,
        };
        let result = self
            .parse_image(&image_data_url)
            .await
            .retry_with_async(|_| async { self.parse_image(&image_data_url).await })
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "OCR succeeded after retrying {} times (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "OCR failed after exhausting all {} retrying attempts with error \
                     {fatal_error:?}. Previous transient failures: [{}]",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        match result {
            ResolvedResult::Ok { output, .. } => Ok(OcrPageOutput {
                text: Some(output),
                errors: vec![],
            }),
            ResolvedResult::Recovered {
                output,
                retry_errors,
                ..
            } => Ok(OcrPageOutput {
                text: Some(output),
                errors: retry_errors
                    .into_iter()
                    .map(|err| format!("{:?}", err))
                    .collect(),
            }),
            ResolvedResult::Fatal { error, .. } => Err(error),
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => Err(fatal_error),
        }
    }
}

/// The JSON body returned by the parse endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParseResponse {
    /// One entry per parsed file (always one for us).
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,

    /// Did the service fail to process the image?
    #[serde(default)]
    is_errored_on_processing: bool,

    /// Error details. The service returns either a string or an array of
    /// strings here, depending on the failure.
    #[serde(default)]
    error_message: Option<Value>,
}

/// One parsed file within a [`ParseResponse`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    /// The extracted text.
    #[serde(default)]
    parsed_text: String,
}

/// Flatten the service's string-or-array error field into one message.
fn format_error_message(error_message: Option<Value>) -> String {
    match error_message {
        Some(Value::String(message)) => message,
        Some(Value::Array(messages)) => messages
            .iter()
            .filter_map(|message| message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => "no error details provided".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_flatten() {
        assert_eq!(
            format_error_message(Some(Value::String("bad image".to_owned()))),
            "bad image"
        );
        let array = serde_json::json!(["timed out", "try again"]);
        assert_eq!(format_error_message(Some(array)), "timed out; try again");
        assert_eq!(format_error_message(None), "no error details provided");
    }

    #[test]
    fn parse_response_deserializes() {
        let response: ParseResponse = serde_json::from_str(
            r#"{
                "ParsedResults": [{"ParsedText": "CARTE NATIONALE D'IDENTITÉ"}],
                "OCRExitCode": 1,
                "IsErroredOnProcessing": false
            }"#,
        )
        .unwrap();
        assert!(!response.is_errored_on_processing);
        let results = response.parsed_results.unwrap();
        assert_eq!(results[0].parsed_text, "CARTE NATIONALE D'IDENTITÉ");
    }
}
