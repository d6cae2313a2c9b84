//! Telegram adapter (teloxide).
//!
//! Implements the `tdr-core` source transport over the Bot API file endpoints
//! and sends the dispatcher's replies back to the chat.

use async_trait::async_trait;
use teloxide::{net::Download, prelude::*, types::ParseMode};
use tokio::{io::AsyncWrite, time::sleep};

pub mod handlers;
pub mod router;

use tdr_core::{
    domain::{FileRef, RemoteLocator},
    errors::Error,
    formatting::Reply,
    ports::SourceTransport,
    Result,
};

/// Inbound files, fetched through `getFile` and the file download endpoint.
#[derive(Clone)]
pub struct TelegramSource {
    bot: Bot,
}

impl TelegramSource {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl SourceTransport for TelegramSource {
    async fn resolve_download_info(&self, file: &FileRef) -> Result<RemoteLocator> {
        let f = self
            .bot
            .get_file(file.0.clone())
            .await
            .map_err(|e| Error::Download(format!("telegram get_file error: {e}")))?;
        Ok(RemoteLocator {
            path: f.path.clone(),
            size: Some(u64::from(f.size)),
        })
    }

    async fn stream_download(
        &self,
        locator: &RemoteLocator,
        dst: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        self.bot
            .download_file(&locator.path, dst)
            .await
            .map_err(|e| Error::Download(format!("telegram download error: {e}")))
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }

    pub async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(chat_id, html.to_string())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    pub async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        self.send_html(chat_id, &reply.html).await
    }
}
