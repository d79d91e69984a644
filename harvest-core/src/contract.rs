//! # contract: seam traits and the plain data that crosses them
//!
//! Three traits separate the pure logic of this crate from the network:
//!
//! - [`Transport`]: sends one HTTP request (with retries) and returns the response.
//! - [`TreeLister`]: describes a remote entry and lists one page of a container.
//! - [`Publisher`]: runs the upload → register → import pipeline for one file.
//!
//! Each trait is annotated for `mockall`, so `MockTransport`, `MockTreeLister` and
//! `MockPublisher` are available to tests (and to downstream crates with the
//! `test-export-mocks` feature).

use std::fmt;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use reqwest::Method;
use serde_json::Value;

use crate::error::{ListError, PipelineError, TransportError};

/// One file part of a multipart form.
#[derive(Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub file: FilePart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

/// A transport-neutral request. It is rebuilt into a wire request on every
/// attempt, so it must own everything it sends.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub method: Method,
    pub url: String,
    /// Header names are lower-case.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, retrying transient failures per the implementation's
    /// policy. Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const IMAGE_MIME_PREFIX: &str = "image/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    Leaf,
}

/// An entry as reported by the remote tree API, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl RemoteEntry {
    /// Folders are containers, images are leaves; everything else is ignored.
    pub fn kind(&self) -> Option<NodeKind> {
        if self.mime_type == FOLDER_MIME_TYPE {
            Some(NodeKind::Container)
        } else if self.mime_type.starts_with(IMAGE_MIME_PREFIX) {
            Some(NodeKind::Leaf)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingPage {
    pub entries: Vec<RemoteEntry>,
    /// Absent (or empty) on the last page.
    pub next_page_token: Option<String>,
}

/// A classified node discovered by the crawler, with its name path below the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Container names from the scan root down, ending with this node's own name.
    pub path: Vec<String>,
}

impl RemoteNode {
    pub fn link(&self) -> String {
        format!("https://drive.google.com/file/d/{}/view", self.id)
    }

    pub fn path_preview(&self) -> String {
        self.path.join("/")
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TreeLister: Send + Sync {
    /// Fetch the metadata of a single entry (used to validate scan roots).
    async fn describe(&self, id: &str) -> Result<RemoteEntry, ListError>;

    /// Fetch one page of the direct children of `container_id`.
    async fn list_page(
        &self,
        container_id: &str,
        page_token: Option<String>,
    ) -> Result<ListingPage, ListError>;
}

/// A local file staged for publishing.
#[derive(Clone, PartialEq)]
pub struct PendingFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFile")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PendingFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        PendingFile {
            filename: filename.into(),
            bytes,
        }
    }

    /// The filename with its final extension removed.
    pub fn batch_name(&self) -> String {
        match self.filename.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => self.filename.clone(),
        }
    }
}

/// Where the publishing pipeline is (or stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uploading,
    Registering,
    Importing,
    Done,
    Failed,
}

impl PipelineState {
    /// Human name of the step performed in this state.
    pub fn step_name(self) -> &'static str {
        match self {
            PipelineState::Uploading => "Upload",
            PipelineState::Registering => "Registration",
            PipelineState::Importing => "Import",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub ok: bool,
    pub message: String,
    /// Set once registration succeeded, even if the import later failed.
    pub batch_id: Option<i64>,
    /// The step that failed, when `ok` is false.
    pub failed_at: Option<PipelineState>,
    /// The uploaded object left without a batch (or without an import).
    pub orphaned_file_link: Option<String>,
}

impl PipelineOutcome {
    pub fn imported(batch_id: i64) -> Self {
        PipelineOutcome {
            ok: true,
            message: format!("Uploaded and imported. Batch ID: {batch_id}"),
            batch_id: Some(batch_id),
            failed_at: None,
            orphaned_file_link: None,
        }
    }

    pub fn failed(
        error: &PipelineError,
        batch_id: Option<i64>,
        orphaned_file_link: Option<String>,
    ) -> Self {
        PipelineOutcome {
            ok: false,
            message: error.to_string(),
            batch_id,
            failed_at: Some(error.stage),
            orphaned_file_link,
        }
    }

    pub fn state(&self) -> PipelineState {
        if self.ok {
            PipelineState::Done
        } else {
            PipelineState::Failed
        }
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Run the full pipeline for one file. Never panics and never returns an
    /// error: every failure is reported inside the outcome.
    async fn publish(&self, file: PendingFile) -> PipelineOutcome;
}
