//! Google Drive adapter.
//!
//! Implements the destination ports on top of the Drive v3 REST API: a fresh
//! OAuth2 token per transfer, then one multipart upload into the user's folder.

mod auth;

use std::{io::Cursor, path::Path};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tdr_core::{
    credential::Credential,
    domain::ObjectId,
    errors::Error,
    ports::{DestinationClient, DestinationService},
    Result,
};

pub use auth::DRIVE_FILE_SCOPE;

#[derive(Clone, Debug)]
pub struct GoogleDrive {
    http: reqwest::Client,
    upload_base: String,
}

impl GoogleDrive {
    /// `upload_base` is the Drive upload root, e.g.
    /// `https://www.googleapis.com/upload/drive/v3`.
    pub fn new(http: reqwest::Client, upload_base: impl Into<String>) -> Self {
        Self {
            http,
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DestinationService for GoogleDrive {
    async fn authenticate(&self, credential: &Credential) -> Result<Box<dyn DestinationClient>> {
        let token = auth::access_token(&self.http, credential).await?;
        tracing::debug!(kind = credential.kind(), "drive session opened");
        Ok(Box::new(DriveSession {
            http: self.http.clone(),
            upload_base: self.upload_base.clone(),
            token,
        }))
    }
}

/// Single-transfer Drive session holding a short-lived access token.
struct DriveSession {
    http: reqwest::Client,
    upload_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[async_trait]
impl DestinationClient for DriveSession {
    async fn create_object(&self, name: &str, parent_id: &str, content: &Path) -> Result<ObjectId> {
        let file = tokio::fs::File::open(content).await.map_err(Error::Io)?;
        let content_len = file.metadata().await.map_err(Error::Io)?.len();
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
        });

        let boundary = format!("tdr-{}", Utc::now().timestamp_micros());
        let (head, tail) = multipart_frame(&boundary, &metadata, guess_mime(name));
        let total_len = head.len() as u64 + content_len + tail.len() as u64;
        // Streamed from disk; only the framing is held in memory.
        let reader = Cursor::new(head).chain(file).chain(Cursor::new(tail));
        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        let url = format!(
            "{}/files?uploadType=multipart&fields=id&supportsAllDrives=true",
            self.upload_base
        );

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .header(reqwest::header::CONTENT_LENGTH, total_len)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Upload(format!("drive request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upload(format!(
                "drive upload failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let created: CreatedFile = resp
            .json()
            .await
            .map_err(|e| Error::Upload(format!("drive json error: {e}")))?;
        if created.id.trim().is_empty() {
            return Err(Error::Upload("drive returned an empty file id".to_string()));
        }
        Ok(ObjectId(created.id))
    }
}

/// Framing for Drive's `uploadType=multipart` body: everything before and
/// after the media bytes. reqwest's multipart support only speaks
/// `form-data`, so this is built by hand.
fn multipart_frame(
    boundary: &str,
    metadata: &serde_json::Value,
    mime: &str,
) -> (Vec<u8>, Vec<u8>) {
    let head = format!(
        "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{boundary}\r\nContent-Type: {mime}\r\n\r\n"
    );
    let tail = format!("\r\n--{boundary}--\r\n");
    (head.into_bytes(), tail.into_bytes())
}

fn guess_mime(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    pub const TEST_KEY: &str = include_str!("testdata/service_account_key.pem");
}
