//! Telegram message → transport-neutral [`InboundEvent`].

use teloxide::types::{Message, User};

use tdr_core::{
    dispatch::{InboundEvent, Origin, RawContentKind},
    domain::{FileRef, MessageId, UserId},
};

pub(super) fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub(super) fn origin(user: &User) -> Origin {
    let display_name = user
        .username
        .clone()
        .or_else(|| Some(user.full_name()).filter(|n| !n.trim().is_empty()));
    Origin {
        user_id: UserId(user.id.0 as i64),
        display_name,
    }
}

/// Commands start with `/`; anything else is plain text.
pub(super) fn from_text(origin: Origin, text: &str) -> InboundEvent {
    if text.starts_with('/') {
        let (name, args) = parse_command(text);
        return InboundEvent::Command { origin, name, args };
    }
    InboundEvent::Text { origin }
}

fn file_event(
    origin: Origin,
    msg: &Message,
    kind: RawContentKind,
    file_id: &str,
    file_name: Option<&str>,
) -> InboundEvent {
    InboundEvent::File {
        origin,
        message_id: MessageId(msg.id.0),
        kind,
        file_ref: FileRef(file_id.to_string()),
        file_name: file_name.map(str::to_string),
    }
}

pub(super) fn from_message(origin: Origin, msg: &Message) -> InboundEvent {
    if let Some(text) = msg.text() {
        return from_text(origin, text);
    }
    if let Some(doc) = msg.document() {
        return file_event(
            origin,
            msg,
            RawContentKind::Document,
            &doc.file.id,
            doc.file_name.as_deref(),
        );
    }
    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        // Sizes are ordered smallest first.
        return file_event(origin, msg, RawContentKind::Image, &best.file.id, None);
    }
    if let Some(video) = msg.video() {
        return file_event(
            origin,
            msg,
            RawContentKind::Video,
            &video.file.id,
            video.file_name.as_deref(),
        );
    }
    InboundEvent::File {
        origin,
        message_id: MessageId(msg.id.0),
        kind: RawContentKind::Other(other_kind(msg).to_string()),
        file_ref: FileRef(String::new()),
        file_name: None,
    }
}

fn other_kind(msg: &Message) -> &'static str {
    if msg.voice().is_some() {
        "voice"
    } else if msg.audio().is_some() {
        "audio"
    } else if msg.sticker().is_some() {
        "sticker"
    } else if msg.animation().is_some() {
        "animation"
    } else if msg.video_note().is_some() {
        "video_note"
    } else if msg.location().is_some() {
        "location"
    } else if msg.contact().is_some() {
        "contact"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn who() -> Origin {
        Origin {
            user_id: UserId(7),
            display_name: None,
        }
    }

    #[test]
    fn parse_command_strips_bot_name_and_splits_args() {
        assert_eq!(
            parse_command("/setfolder@relay_bot  1AbC  "),
            ("setfolder".to_string(), "1AbC".to_string())
        );
        assert_eq!(parse_command("/START"), ("start".to_string(), String::new()));
        assert_eq!(
            parse_command("/setfolder a b"),
            ("setfolder".to_string(), "a b".to_string())
        );
    }

    #[test]
    fn text_becomes_command_or_plain_text() {
        match from_text(who(), "/status") {
            InboundEvent::Command { name, args, .. } => {
                assert_eq!(name, "status");
                assert!(args.is_empty());
            }
            other => panic!("expected command, got {other:?}"),
        }
        assert!(matches!(
            from_text(who(), "hello"),
            InboundEvent::Text { .. }
        ));
    }
}
