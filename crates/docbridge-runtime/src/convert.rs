//! Client for the server's `POST /convert` endpoint.
//!
//! One multipart upload per file, one response back. No retries and no
//! streaming; failures are reported per file and never touch the
//! supervisor's state.

use std::borrow::Cow;
use std::path::Path;

use docbridge_core::{ConversionError, ServiceEndpoint};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

/// Longest error body passed through verbatim.
pub const MAX_ERROR_DETAIL_CHARS: usize = 500;

/// How tables are rendered in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableMode {
    #[default]
    Markdown,
    List,
}

impl TableMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::List => "list",
        }
    }
}

/// Optional conversion flags. Unset flags are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    pub ocr_enabled: Option<bool>,
    pub rag_clean: Option<bool>,
    pub table_mode: Option<TableMode>,
    pub debug_mode: Option<bool>,
}

/// Successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversionOutput {
    pub markdown: String,
    /// Retrieval-friendly text, when the server produced it.
    #[serde(default)]
    pub rag_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Multipart upload client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct ConvertClient {
    client: Client,
    endpoint: ServiceEndpoint,
}

impl ConvertClient {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        let client = Client::builder().no_proxy().build().unwrap_or_default();
        Self { client, endpoint }
    }

    /// Upload `path` and return the converted Markdown.
    pub async fn convert(
        &self,
        path: &Path,
        options: &ConvertOptions,
    ) -> Result<ConversionOutput, ConversionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ConversionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

        debug!(file = %file_name, bytes = bytes.len(), "Uploading document for conversion");
        let form = build_form(Part::bytes(bytes).file_name(file_name.clone()), options);

        let response = self
            .client
            .post(self.endpoint.convert_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ConversionError::Transport(e.to_string()))?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let body = response
            .text()
            .await
            .map_err(|e| ConversionError::Transport(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(ConversionError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let output = parse_success(&body, is_json)?;
        info!(file = %file_name, chars = output.markdown.len(), "Document converted");
        Ok(output)
    }
}

fn build_form(file: Part, options: &ConvertOptions) -> Form {
    let mut form = Form::new().part("file", file);
    let flags = [
        ("ocr_enabled", options.ocr_enabled),
        ("rag_clean", options.rag_clean),
        ("debug_mode", options.debug_mode),
    ];
    for (name, value) in flags {
        if let Some(value) = value {
            form = form.text(name, value.to_string());
        }
    }
    if let Some(mode) = options.table_mode {
        form = form.text("table_mode", mode.as_str());
    }
    form
}

/// Interpret a `200` body: JSON `{markdown, rag_text?}` or plain Markdown.
pub fn parse_success(body: &str, is_json: bool) -> Result<ConversionOutput, ConversionError> {
    if is_json {
        return serde_json::from_str(body)
            .map_err(|e| ConversionError::MalformedResponse(e.to_string()));
    }
    Ok(ConversionOutput {
        markdown: body.to_string(),
        rag_text: None,
    })
}

/// Human-readable failure detail from an error body.
///
/// Prefers the JSON `detail` field; otherwise the raw text, capped at
/// [`MAX_ERROR_DETAIL_CHARS`] characters.
pub fn error_detail(body: &str) -> String {
    if let Ok(ErrorBody { detail }) = serde_json::from_str::<ErrorBody>(body) {
        return match detail {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        };
    }

    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_DETAIL_CHARS {
        return trimmed.to_string();
    }
    let mut capped: String = trimmed.chars().take(MAX_ERROR_DETAIL_CHARS).collect();
    capped.push('…');
    capped
}

/// `<stem>.md` for an input document.
pub fn markdown_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map_or(Cow::Borrowed("document"), |s| s.to_string_lossy());
    format!("{stem}.md")
}
