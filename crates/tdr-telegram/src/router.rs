use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher as UpdateDispatcher, dptree, prelude::*};
use tokio::sync::{Mutex, OwnedMutexGuard};

use tdr_core::{config::Config, dispatch::Dispatcher, domain::UserId, staging::StagingArea};

use crate::{handlers, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub messenger: TelegramMessenger,
    pub user_locks: Arc<UserLocks>,
}

/// Serializes event handling per user, so two events from one user never
/// interleave their record reads and writes.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Idle entries are referenced only by the map.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub async fn run_polling(
    bot: Bot,
    cfg: Arc<Config>,
    staging: Arc<StagingArea>,
    dispatcher: Arc<Dispatcher>,
) -> anyhow::Result<()> {
    staging.prepare().await?;

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }
    if cfg.telegram_allowed_users.is_empty() {
        tracing::warn!("TELEGRAM_ALLOWED_USERS is empty; the bot accepts every user");
    } else {
        tracing::info!(allowed = cfg.telegram_allowed_users.len(), "allow-list loaded");
    }
    tracing::info!(staging = %staging.dir().display(), "staging ready");

    let state = Arc::new(AppState {
        cfg,
        dispatcher,
        messenger: TelegramMessenger::new(bot.clone()),
        user_locks: Arc::new(UserLocks::default()),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    UpdateDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
