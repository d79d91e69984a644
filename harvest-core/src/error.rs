//! Error types shared across the crawler, flattener and publishing pipeline.
//!
//! Every fallible HTTP step ends in one of two shapes: a [`TransportError`] when
//! no response was obtained at all, or an [`HttpFailure`] when the remote side
//! answered with something we cannot use. [`HttpFailure`] renders the four-line
//! diagnostic operators paste into tickets (status, request line, headers, body).

use std::fmt;

use thiserror::Error;

use crate::contract::{HttpResponse, PipelineState};

/// Response bodies are cut to this many characters in diagnostics.
pub const BODY_EXCERPT_LIMIT: usize = 2000;

/// Failure to obtain any HTTP response, after the retry policy gave up.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("could not connect for {method} {url} after {attempts} attempt(s): {message}")]
    Connect {
        method: String,
        url: String,
        attempts: u32,
        message: String,
    },
    #[error("{method} {url} timed out after {attempts} attempt(s): {message}")]
    Timeout {
        method: String,
        url: String,
        attempts: u32,
        message: String,
    },
    #[error("{method} {url} failed after {attempts} attempt(s): {message}")]
    Network {
        method: String,
        url: String,
        attempts: u32,
        message: String,
    },
    #[error("could not build request {method} {url}: {reason}")]
    Build {
        method: String,
        url: String,
        reason: String,
    },
}

impl TransportError {
    /// Number of attempts made before giving up (zero when the request never left).
    pub fn attempts(&self) -> u32 {
        match self {
            TransportError::Connect { attempts, .. }
            | TransportError::Timeout { attempts, .. }
            | TransportError::Network { attempts, .. } => *attempts,
            TransportError::Build { .. } => 0,
        }
    }
}

/// A non-success (or unusable) HTTP response, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpFailure {
    pub status: u16,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Body excerpt, at most [`BODY_EXCERPT_LIMIT`] characters.
    pub body: String,
}

impl HttpFailure {
    pub fn from_response(response: &HttpResponse) -> Self {
        HttpFailure {
            status: response.status,
            method: response.method.to_string(),
            url: response.url.clone(),
            headers: response.headers.clone(),
            body: response.body.chars().take(BODY_EXCERPT_LIMIT).collect(),
        }
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HTTP {}", self.status)?;
        writeln!(f, "URL: {} {}", self.method, self.url)?;
        write!(f, "Headers: {{")?;
        for (index, (name, value)) in self.headers.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{name}': '{value}'")?;
        }
        writeln!(f, "}}")?;
        write!(f, "Body: {}", self.body)
    }
}

impl std::error::Error for HttpFailure {}

/// Failure of a single publishing step (upload, registration or import).
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("{0}")]
    Status(HttpFailure),
    #[error("{reason}:\n{failure}")]
    Malformed {
        reason: String,
        failure: HttpFailure,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of one directory listing request against the remote tree.
#[derive(Debug, Clone, Error)]
pub enum ListError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Status(HttpFailure),
    #[error("unusable listing response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("scan root {root_id} is not accessible: {source}")]
    RootInaccessible {
        root_id: String,
        #[source]
        source: ListError,
    },
    #[error("scan root {root_id} ({name}) is not a folder")]
    NotAContainer { root_id: String, name: String },
    #[error("listing page {page} of container {container_id} failed after {attempts} attempt(s): {source}")]
    PageFailed {
        container_id: String,
        page: usize,
        attempts: u32,
        #[source]
        source: ListError,
    },
}

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected `{field}` to be {expected}")]
    UnexpectedShape {
        field: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table has no header row")]
    MissingHeader,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
    #[error("{field} is required")]
    Missing { field: &'static str },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("could not write batch report to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialise batch report: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Two different files in one batch would register batches of the same name.
#[derive(Debug, Error)]
#[error("{first} and {second} would both register batch `{batch_name}`")]
pub struct DuplicateBatchName {
    pub batch_name: String,
    pub first: String,
    pub second: String,
}

/// A pipeline step failure, tagged with the state the pipeline was in.
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub stage: PipelineState,
    pub source: StepError,
}

impl PipelineError {
    pub fn new(stage: PipelineState, source: StepError) -> Self {
        PipelineError { stage, source }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = self.stage.step_name();
        match &self.source {
            StepError::Malformed { reason, failure } => {
                write!(f, "{step} step returned {reason}:\n{failure}")
            }
            other => write!(f, "{step} step failed:\n{other}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
