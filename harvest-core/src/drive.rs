//! Google Drive v3 implementation of [`TreeLister`].

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::auth::auth_headers;
use crate::config::CrawlConfig;
use crate::contract::{
    HttpRequest, HttpResponse, ListingPage, RemoteEntry, Transport, TreeLister, FOLDER_MIME_TYPE,
};
use crate::error::{HttpFailure, ListError};

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";
const DESCRIBE_FIELDS: &str = "id, name, mimeType";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        RemoteEntry {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
        }
    }
}

pub struct DriveLister<T: Transport> {
    transport: T,
    api_base: String,
    access_token: String,
    page_size: u32,
}

impl<T: Transport> DriveLister<T> {
    pub fn new(transport: T, config: &CrawlConfig, access_token: impl Into<String>) -> Self {
        DriveLister {
            transport,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            page_size: config.page_size,
        }
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, ListError> {
        let base = format!("{}/{}", self.api_base, path);
        Url::parse_with_params(&base, params).map_err(|e| ListError::Malformed {
            url: base.clone(),
            reason: e.to_string(),
        })
    }

    async fn get_json<D: serde::de::DeserializeOwned>(&self, url: Url) -> Result<D, ListError> {
        let request = HttpRequest::get(url.as_str()).headers(auth_headers(&self.access_token));
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(ListError::Status(HttpFailure::from_response(&response)));
        }
        parse(&response)
    }
}

fn parse<D: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<D, ListError> {
    serde_json::from_str(&response.body).map_err(|e| ListError::Malformed {
        url: response.url.clone(),
        reason: e.to_string(),
    })
}

/// Children query: untrashed folders and images directly under `container_id`.
pub fn children_query(container_id: &str) -> String {
    let escaped = container_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "'{escaped}' in parents and trashed = false and (mimeType = '{FOLDER_MIME_TYPE}' or mimeType contains 'image/')"
    )
}

#[async_trait]
impl<T: Transport> TreeLister for DriveLister<T> {
    async fn describe(&self, id: &str) -> Result<RemoteEntry, ListError> {
        let url = self.url(
            &format!("files/{}", urlencoding::encode(id)),
            &[
                ("fields", DESCRIBE_FIELDS.to_string()),
                ("supportsAllDrives", "true".to_string()),
            ],
        )?;
        let file: DriveFile = self.get_json(url).await?;
        Ok(file.into())
    }

    async fn list_page(
        &self,
        container_id: &str,
        page_token: Option<String>,
    ) -> Result<ListingPage, ListError> {
        let mut params = vec![
            ("q", children_query(container_id)),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", self.page_size.to_string()),
            ("corpora", "allDrives".to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let url = self.url("files", &params)?;
        let list: FileList = self.get_json(url).await?;
        debug!(
            container_id,
            entries = list.files.len(),
            has_next = list.next_page_token.is_some(),
            "Listed Drive page"
        );
        Ok(ListingPage {
            entries: list.files.into_iter().map(RemoteEntry::from).collect(),
            next_page_token: list.next_page_token.filter(|token| !token.is_empty()),
        })
    }
}
