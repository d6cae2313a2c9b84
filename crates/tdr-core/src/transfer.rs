//! Download → authenticate → upload → share link.
//!
//! No step retries; a failure is reported and the user resends the file. The
//! staging artifact is released on every exit path.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    domain::{FileRef, MessageId, ObjectId, UserId},
    errors::Error,
    onboarding::SetupStep,
    ports::{DestinationService, SourceTransport},
    record::UserStore,
    staging::{StagedFile, StagingArea},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Document,
    Image,
    Video,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Document => "document",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
        }
    }
}

/// One inbound file, consumed by a single [`TransferPipeline::transfer`] call.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub source_file_ref: FileRef,
    pub file_name: String,
    pub content_kind: ContentKind,
}

impl TransferRequest {
    pub fn new(
        source_file_ref: FileRef,
        given_name: Option<&str>,
        content_kind: ContentKind,
        message_id: MessageId,
    ) -> Self {
        Self {
            source_file_ref,
            file_name: resolve_file_name(given_name, content_kind, message_id),
            content_kind,
        }
    }
}

/// Use the source-provided name, or synthesize one from the content kind and
/// the message id (unique within the chat).
pub fn resolve_file_name(
    given: Option<&str>,
    kind: ContentKind,
    message_id: MessageId,
) -> String {
    if let Some(name) = given.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    let id = message_id.0;
    match kind {
        ContentKind::Image => format!("photo_{id}.jpg"),
        ContentKind::Video => format!("video_{id}.mp4"),
        ContentKind::Document => format!("document_{id}"),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareableReference {
    pub object_id: ObjectId,
    pub url: String,
}

pub fn share_url(base: &str, object_id: &ObjectId) -> String {
    format!("{}/file/d/{}/view", base.trim_end_matches('/'), object_id.0)
}

pub struct TransferPipeline {
    store: Arc<dyn UserStore>,
    source: Arc<dyn SourceTransport>,
    destination: Arc<dyn DestinationService>,
    staging: Arc<StagingArea>,
    share_base: String,
}

impl TransferPipeline {
    pub fn new(
        store: Arc<dyn UserStore>,
        source: Arc<dyn SourceTransport>,
        destination: Arc<dyn DestinationService>,
        staging: Arc<StagingArea>,
        share_base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            destination,
            staging,
            share_base: share_base.into(),
        }
    }

    pub async fn transfer(
        &self,
        user_id: UserId,
        req: TransferRequest,
    ) -> Result<ShareableReference> {
        let staged = self
            .staging
            .stage(&req.file_name)
            .await
            .map_err(as_download)?;
        let out = self.run(user_id, &req, &staged).await;
        staged.release().await;

        match &out {
            Ok(r) => tracing::info!(
                %user_id,
                kind = req.content_kind.as_str(),
                object_id = %r.object_id,
                "transfer complete"
            ),
            Err(e) => tracing::warn!(
                %user_id,
                kind = req.content_kind.as_str(),
                error_kind = e.kind(),
                "transfer failed: {e}"
            ),
        }
        out
    }

    async fn run(
        &self,
        user_id: UserId,
        req: &TransferRequest,
        staged: &StagedFile,
    ) -> Result<ShareableReference> {
        let size = self.download(req, staged).await?;
        tracing::debug!(%user_id, size, file = %req.file_name, "staged");

        let record = self.store.get(user_id).await?;
        let Some(record) = record else {
            return Err(Error::MissingSetup(SetupStep::Credential));
        };
        let credential = record
            .credential
            .ok_or(Error::MissingSetup(SetupStep::Credential))?;
        let parent_id = record
            .destination_id
            .ok_or(Error::MissingSetup(SetupStep::Destination))?;

        let client = self
            .destination
            .authenticate(&credential)
            .await
            .map_err(as_authentication)?;

        let object_id = client
            .create_object(&req.file_name, &parent_id, staged.path())
            .await
            .map_err(as_upload)?;

        Ok(ShareableReference {
            url: share_url(&self.share_base, &object_id),
            object_id,
        })
    }

    async fn download(&self, req: &TransferRequest, staged: &StagedFile) -> Result<u64> {
        let locator = self
            .source
            .resolve_download_info(&req.source_file_ref)
            .await
            .map_err(as_download)?;

        let mut dst = tokio::fs::File::create(staged.path())
            .await
            .map_err(|e| Error::Download(format!("cannot create staging file: {e}")))?;
        self.source
            .stream_download(&locator, &mut dst)
            .await
            .map_err(as_download)?;
        dst.flush().await.map_err(|e| as_download(e.into()))?;

        let meta = dst.metadata().await.map_err(|e| as_download(e.into()))?;
        Ok(meta.len())
    }
}

/// Fetch a small inbound file into memory, refusing anything over `max_bytes`.
pub async fn fetch_bytes(
    source: &dyn SourceTransport,
    file: &FileRef,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    let locator = source
        .resolve_download_info(file)
        .await
        .map_err(as_download)?;
    if locator.size.is_some_and(|s| s > max_bytes) {
        return Err(Error::InvalidCredentialFormat(format!(
            "file is larger than {max_bytes} bytes"
        )));
    }

    let mut buf = CappedBuffer::new(max_bytes);
    let streamed = source.stream_download(&locator, &mut buf).await;
    if buf.overflowed {
        return Err(Error::InvalidCredentialFormat(format!(
            "file is larger than {max_bytes} bytes"
        )));
    }
    streamed.map_err(as_download)?;
    Ok(buf.bytes)
}

/// In-memory sink that refuses to grow past `limit`; the refused write fails
/// the download instead of buffering the rest of the stream.
struct CappedBuffer {
    bytes: Vec<u8>,
    limit: u64,
    overflowed: bool,
}

impl CappedBuffer {
    fn new(limit: u64) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            overflowed: false,
        }
    }
}

impl AsyncWrite for CappedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        if this.bytes.len() as u64 + buf.len() as u64 > this.limit {
            this.overflowed = true;
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "size limit exceeded",
            )));
        }
        this.bytes.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn as_download(e: Error) -> Error {
    match e {
        Error::Download(_) => e,
        other => Error::Download(other.to_string()),
    }
}

fn as_authentication(e: Error) -> Error {
    match e {
        Error::Authentication(_) => e,
        other => Error::Authentication(other.to_string()),
    }
}

fn as_upload(e: Error) -> Error {
    match e {
        Error::Upload(_) | Error::Authentication(_) => e,
        other => Error::Upload(other.to_string()),
    }
}
