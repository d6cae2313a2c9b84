use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::{
    credential::Credential,
    domain::{FileRef, ObjectId, RemoteLocator},
    Result,
};

/// Hexagonal port for fetching inbound files from the chat transport.
///
/// Failures are expected to surface as [`crate::Error::Download`].
#[async_trait]
pub trait SourceTransport: Send + Sync {
    async fn resolve_download_info(&self, file: &FileRef) -> Result<RemoteLocator>;

    /// Stream the full file content into `dst`.
    async fn stream_download(
        &self,
        locator: &RemoteLocator,
        dst: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()>;
}

/// Hexagonal port for the cloud storage destination.
///
/// Called fresh for every transfer: a session never crosses users and never
/// outlives the transfer that created it.
#[async_trait]
pub trait DestinationService: Send + Sync {
    async fn authenticate(&self, credential: &Credential) -> Result<Box<dyn DestinationClient>>;
}

/// An authenticated, single-transfer destination session.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Create `name` under `parent_id` from the staged file at `content` and
    /// return only the new object's id.
    async fn create_object(&self, name: &str, parent_id: &str, content: &Path)
        -> Result<ObjectId>;
}
