//! # publish: upload → register → import for one file
//!
//! [`HttpPublisher`] drives the three remote steps strictly in order:
//!
//! 1. **Upload** the raw bytes as a multipart form; the response carries a `fileLink`.
//! 2. **Register** a batch named after the file, referencing the uploaded object.
//! 3. **Import** the batch so its rows become work items.
//!
//! A step starts only after the previous one succeeded. Nothing is retried
//! at this level (the transport already retries transient failures) and
//! nothing is rolled back: an object uploaded before a later failure stays on
//! the platform, and the outcome names it so an operator can clean it up.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::auth::auth_headers;
use crate::config::PublishConfig;
use crate::contract::{
    FilePart, HttpRequest, HttpResponse, MultipartForm, PendingFile, PipelineOutcome,
    PipelineState, Publisher, Transport,
};
use crate::error::{HttpFailure, PipelineError, StepError};

pub const UPLOAD_FILE_FIELD: &str = "file";
pub const UPLOAD_MIME: &str = "text/csv";

/// Reference to an object stored by the upload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectRef {
    pub file_link: String,
    /// Percent-decoded last path segment of `file_link`.
    pub object_name: String,
}

impl RemoteObjectRef {
    pub fn from_link(file_link: impl Into<String>) -> Self {
        let file_link = file_link.into();
        let segment = file_link.rsplit('/').next().unwrap_or_default();
        let object_name = urlencoding::decode(segment)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        RemoteObjectRef {
            file_link,
            object_name,
        }
    }
}

pub struct HttpPublisher<T: Transport> {
    transport: T,
    target: PublishConfig,
    token: String,
}

impl<T: Transport> HttpPublisher<T> {
    pub fn new(transport: T, target: PublishConfig, token: impl Into<String>) -> Self {
        HttpPublisher {
            transport,
            target,
            token: token.into(),
        }
    }

    fn batches_url(&self) -> &str {
        self.target.batches_url.trim_end_matches('/')
    }

    fn json_headers(&self) -> Vec<(String, String)> {
        let mut headers = auth_headers(&self.token);
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        headers
    }

    pub async fn upload(&self, file: &PendingFile) -> Result<RemoteObjectRef, StepError> {
        let form = MultipartForm {
            fields: vec![("project_type".to_string(), self.target.project_type.clone())],
            file: FilePart {
                field: UPLOAD_FILE_FIELD.to_string(),
                filename: file.filename.clone(),
                mime: UPLOAD_MIME.to_string(),
                bytes: file.bytes.clone(),
            },
        };
        let request = HttpRequest::post(&self.target.upload_url)
            .headers(auth_headers(&self.token))
            .multipart(form);
        let response = success(self.transport.send(request).await?)?;
        let payload = parse_json(&response)?;
        let link = payload
            .get("fileLink")
            .and_then(Value::as_str)
            .filter(|link| !link.is_empty())
            .ok_or_else(|| StepError::Malformed {
                reason: "no 'fileLink' in response".to_string(),
                failure: HttpFailure::from_response(&response),
            })?;
        Ok(RemoteObjectRef::from_link(link))
    }

    pub fn registration_payload(&self, object: &RemoteObjectRef, batch_name: &str) -> Value {
        json!({
            "name": batch_name,
            "folder": object.file_link,
            "description": "",
            "status": "draft",
            "files": [],
            "isRLHFFolder": true,
            "project": {
                "id": self.target.project_id,
                "name": self.target.project_name,
                "status": "ongoing",
                "projectType": self.target.project_type,
                "readonly": false,
            },
            "sourceFiles": [object.object_name],
            "projectId": self.target.project_id,
            "projectType": self.target.project_type,
        })
    }

    /// Returns the new batch id.
    pub async fn register(
        &self,
        object: &RemoteObjectRef,
        batch_name: &str,
    ) -> Result<i64, StepError> {
        let request = HttpRequest::post(self.batches_url())
            .headers(self.json_headers())
            .json(self.registration_payload(object, batch_name));
        let response = success(self.transport.send(request).await?)?;
        let payload = parse_json(&response)?;
        payload
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| StepError::Malformed {
                reason: "no integer batch 'id' in response".to_string(),
                failure: HttpFailure::from_response(&response),
            })
    }

    /// An empty response body is success with no payload.
    pub async fn import(&self, batch_id: i64) -> Result<Option<Value>, StepError> {
        let url = format!(
            "{}/{}/import-{}",
            self.batches_url(),
            batch_id,
            self.target.project_type
        );
        let request = HttpRequest::post(url).headers(auth_headers(&self.token));
        let response = success(self.transport.send(request).await?)?;
        if response.body.trim().is_empty() {
            return Ok(None);
        }
        parse_json(&response).map(Some)
    }
}

fn success(response: HttpResponse) -> Result<HttpResponse, StepError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(StepError::Status(HttpFailure::from_response(&response)))
    }
}

fn parse_json(response: &HttpResponse) -> Result<Value, StepError> {
    serde_json::from_str(&response.body).map_err(|_| StepError::Malformed {
        reason: "non-JSON".to_string(),
        failure: HttpFailure::from_response(response),
    })
}

#[async_trait]
impl<T: Transport> Publisher for HttpPublisher<T> {
    async fn publish(&self, file: PendingFile) -> PipelineOutcome {
        let batch_name = file.batch_name();
        info!(file = %file.filename, step = 1, "Uploading");
        let object = match self.upload(&file).await {
            Ok(object) => object,
            Err(e) => {
                let failure = PipelineError::new(PipelineState::Uploading, e);
                error!(file = %file.filename, error = %failure, "Upload failed");
                return PipelineOutcome::failed(&failure, None, None);
            }
        };

        info!(file = %file.filename, step = 2, batch_name = %batch_name, "Registering batch");
        let batch_id = match self.register(&object, &batch_name).await {
            Ok(id) => id,
            Err(e) => {
                let failure = PipelineError::new(PipelineState::Registering, e);
                error!(file = %file.filename, error = %failure, "Batch registration failed");
                warn!(file_link = %object.file_link, "Uploaded object left without a batch");
                return PipelineOutcome::failed(&failure, None, Some(object.file_link));
            }
        };

        info!(file = %file.filename, step = 3, batch_id, "Importing batch");
        match self.import(batch_id).await {
            Ok(_) => {
                info!(file = %file.filename, batch_id, "Uploaded and imported");
                PipelineOutcome::imported(batch_id)
            }
            Err(e) => {
                let failure = PipelineError::new(PipelineState::Importing, e);
                error!(file = %file.filename, batch_id, error = %failure, "Import failed");
                warn!(file_link = %object.file_link, batch_id, "Batch registered but not imported");
                PipelineOutcome::failed(&failure, Some(batch_id), Some(object.file_link))
            }
        }
    }
}
