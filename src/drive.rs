use anyhow::{anyhow, Context as AnyhowContext};
use async_trait::async_trait;
use botanical_types::folder::DriveFile;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// The part of Google Drive the pipeline needs.
#[async_trait]
pub trait DriveSource: Send + Sync {
    /// Direct child folders of `parent_id`, oldest first.
    async fn list_subfolders(&self, parent_id: &str) -> Result<Vec<DriveFile>, anyhow::Error>;
    /// Every non-trashed file in `folder_id`, oldest first.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<DriveFile>, anyhow::Error>;
    async fn download(&self, file_id: &str, dest: &Path) -> Result<PathBuf, anyhow::Error>;
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Drive v3 REST client authenticated with a pre-issued OAuth access token.
pub struct GoogleDriveClient {
    client: Client,
    token: String,
}

impl GoogleDriveClient {
    pub fn new(client: Client, token: String) -> Self {
        Self { client, token }
    }

    async fn query(&self, q: &str, fields: &str) -> Result<Vec<DriveFile>, anyhow::Error> {
        let mut files = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("q", q.to_string()),
                ("fields", format!("nextPageToken, files({fields})")),
                ("orderBy", "createdTime".to_string()),
                ("pageSize", "1000".to_string()),
            ];
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }
            let resp = self
                .client
                .get(format!("{API_BASE}/files"))
                .query(&params)
                .bearer_auth(&self.token)
                .send()
                .await?;
            let status = resp.status();
            let text = resp.text().await?;
            if !status.is_success() {
                return Err(anyhow!("Drive API {status}: {}", truncate_body(&text)));
            }
            let mut page: FileList = serde_json::from_str(&text)
                .with_context(|| format!("Drive API decode error. Body: {}", truncate_body(&text)))?;
            files.append(&mut page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl DriveSource for GoogleDriveClient {
    async fn list_subfolders(&self, parent_id: &str) -> Result<Vec<DriveFile>, anyhow::Error> {
        let q = format!(
            "'{}' in parents and mimeType = '{FOLDER_MIME}' and trashed = false",
            escape_query(parent_id)
        );
        self.query(&q, "id, name, mimeType, createdTime").await
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<DriveFile>, anyhow::Error> {
        let q = format!("'{}' in parents and trashed = false", escape_query(folder_id));
        self.query(&q, "id, name, mimeType, createdTime").await
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<PathBuf, anyhow::Error> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let resp = self
            .client
            .get(format!("{API_BASE}/files/{file_id}"))
            .query(&[("alt", "media")])
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Unable to download Drive file {file_id}: {status} {}",
                truncate_body(&text)
            ));
        }
        let bytes = resp.bytes().await?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Unable to write {dest:?}"))?;
        log::debug!("Downloaded {file_id} ({} bytes) to {dest:?}", bytes.len());
        Ok(dest.to_path_buf())
    }
}

fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 220;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}…", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}
