//! Telegram update handlers.
//!
//! One message in, one reply out: authorize, convert to an `InboundEvent`,
//! hand it to the core dispatcher under the sender's lock, send the reply.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use tdr_core::formatting::Reply;

use crate::router::AppState;

mod event;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Channel posts and service messages have no sender to onboard.
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let origin = event::origin(user);
    let chat_id = msg.chat.id;

    if !state.cfg.is_user_allowed(origin.user_id.0) {
        tracing::warn!(user_id = %origin.user_id, "unauthorized user");
        if let Err(e) = state
            .messenger
            .send_reply(chat_id, &Reply::unauthorized())
            .await
        {
            tracing::warn!("failed to send unauthorized reply: {e}");
        }
        return Ok(());
    }

    let user_id = origin.user_id;
    let inbound = event::from_message(origin, &msg);

    let reply = {
        let _guard = state.user_locks.lock_user(user_id).await;
        state.dispatcher.handle(inbound).await
    };

    if let Err(e) = state.messenger.send_reply(chat_id, &reply).await {
        tracing::warn!(%user_id, "failed to send reply: {e}");
    }
    Ok(())
}
