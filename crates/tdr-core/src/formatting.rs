//! User-visible replies (Telegram HTML subset).

use crate::{
    errors::Error,
    onboarding::{OnboardingState, SetupStep},
    record::UserRecord,
};

const SETFOLDER_USAGE: &str = "<b>/setfolder [FOLDER_ID]</b>";
const MAX_DETAIL_LEN: usize = 120;

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    Prompt,
    Error,
    Success,
}

/// Exactly one of these is sent per handled event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub html: String,
}

impl Reply {
    fn prompt(html: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Prompt,
            html: html.into(),
        }
    }

    fn error(html: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Error,
            html: html.into(),
        }
    }

    fn success(html: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Success,
            html: html.into(),
        }
    }

    pub fn welcome() -> Self {
        Self::prompt(
            "👋 Welcome! I upload the files you send me to your Google Drive.\n\n\
             First, upload your Google credentials as a <b>.json</b> file.",
        )
    }

    pub fn next_step(state: OnboardingState) -> Self {
        match state {
            OnboardingState::New | OnboardingState::AwaitingCredential => Self::prompt(
                "🔑 Please upload your Google credentials (<b>.json</b> file) first.",
            ),
            OnboardingState::AwaitingDestination => Self::prompt(format!(
                "🔹 You haven't set a folder yet. Send your Google Drive Folder ID using:\n\n{SETFOLDER_USAGE}"
            )),
            OnboardingState::Ready => Self::prompt(
                "✅ You're all set! Send me a file, and I'll upload it to your Google Drive.",
            ),
        }
    }

    pub fn status(state: OnboardingState, record: &UserRecord) -> Self {
        let credential = record
            .credential
            .as_ref()
            .map(|c| format!("<code>{}</code>", escape_html(c.principal())))
            .unwrap_or_else(|| "not uploaded".to_string());
        let folder = match (&record.credential, &record.destination_id) {
            (Some(_), Some(id)) => format!("<code>{}</code>", escape_html(id)),
            _ => "not set".to_string(),
        };
        Self::prompt(format!(
            "📊 <b>Status</b>: {}\n🔑 Credentials: {credential}\n📂 Folder: {folder}",
            state.as_str()
        ))
    }

    pub fn destination_set(updated: bool, after: OnboardingState) -> Self {
        if after != OnboardingState::Ready {
            return Self::next_step(after);
        }
        if updated {
            return Self::success("✅ Folder ID updated successfully!");
        }
        Self::success(
            "✅ Folder ID set successfully!\nYou can now send files to be uploaded.",
        )
    }

    pub fn credential_set(updated: bool, after: OnboardingState, principal: &str) -> Self {
        let who = escape_html(principal);
        match after {
            OnboardingState::Ready if updated => Self::success(format!(
                "✅ Credentials updated (<code>{who}</code>). Your folder is unchanged."
            )),
            OnboardingState::Ready => Self::success(format!(
                "✅ Credentials saved (<code>{who}</code>). You can now send files."
            )),
            _ => Self::prompt(format!(
                "✅ Credentials saved (<code>{who}</code>).\n\nNow send your Google Drive Folder ID using:\n\n{SETFOLDER_USAGE}"
            )),
        }
    }

    pub fn transfer_done(file_name: &str, url: &str) -> Self {
        Self::success(format!(
            "✅ File uploaded successfully!\n📄 {}\n📂 <a href='{}'>View File</a>",
            escape_html(file_name),
            escape_html(url)
        ))
    }

    pub fn unsupported() -> Self {
        Self::error("❌ Unsupported file type! Send a document, photo, or video.")
    }

    pub fn unknown_command(name: &str) -> Self {
        Self::error(format!(
            "❓ Unknown command: /{}\n\nAvailable: /start, /setfolder, /status, /help",
            escape_html(name)
        ))
    }

    pub fn unauthorized() -> Self {
        Self::error("Unauthorized. Contact the bot owner for access.")
    }

    /// The single place where failures become user-facing text.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::InvalidCredentialFormat(reason) => Self::error(format!(
                "❌ That is not a valid Google credentials file: {}\n\nPlease upload the JSON key again.",
                escape_html(&truncate_text(reason, MAX_DETAIL_LEN))
            )),
            Error::InvalidDestinationId { .. } => {
                Self::error("❌ Invalid folder ID. Please check and try again.")
            }
            Error::MissingSetup(SetupStep::Credential) => Self::error(
                "⚠ Please upload your Google credentials (<b>.json</b> file) first.",
            ),
            Error::MissingSetup(SetupStep::Destination) => Self::error(format!(
                "⚠ You haven't set a Google Drive Folder ID.\nUse:\n\n{SETFOLDER_USAGE}"
            )),
            Error::Download(_) => Self::error(
                "❌ Couldn't download your file from Telegram. Please send it again.",
            ),
            Error::Authentication(_) => Self::error(
                "❌ Upload failed: Google rejected your credentials. \
                 Upload a new credentials file and send the file again.",
            ),
            Error::Upload(_) => {
                Self::error("❌ Upload failed. Please check your folder ID and try again.")
            }
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::External(_) => {
                Self::error("❌ Something went wrong. Please try again.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;

    #[test]
    fn escapes_html_specials() {
        assert_eq!(
            escape_html("<a href=\"x\">&</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("ééé", 3), "ééé");
        assert_eq!(truncate_text("éééé", 3), "ééé...");
    }

    #[test]
    fn error_replies_never_echo_secrets() {
        let reply = Reply::from_error(&Error::Authentication(
            "invalid_grant for refresh_token=1//secret".to_string(),
        ));
        assert_eq!(reply.kind, ReplyKind::Error);
        assert!(!reply.html.contains("secret"));
    }

    #[test]
    fn status_hides_folder_without_credential() {
        let mut rec = UserRecord::new(UserId(1), None);
        rec.destination_id = Some("abc".to_string());
        let reply = Reply::status(OnboardingState::AwaitingCredential, &rec);
        assert!(reply.html.contains("Folder: not set"));
        assert!(reply.html.contains("awaiting_credential"));
    }

    #[test]
    fn transfer_done_links_to_url() {
        let r = Reply::transfer_done("a<b>.pdf", "https://drive.google.com/file/d/X/view");
        assert!(r.html.contains("href='https://drive.google.com/file/d/X/view'"));
        assert!(r.html.contains("a&lt;b&gt;.pdf"));
    }
}
