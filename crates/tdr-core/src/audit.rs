use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{errors::Error, formatting::truncate_text, Result};

const AUDIT_MAX_TEXT: usize = 500;

/// One line of the audit trail. Never carries credential material.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, user_id: i64, username: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            user_id,
            username: username.map(|s| s.to_string()),
            state: None,
            file_name: None,
            object_id: None,
            reason: None,
            error: None,
        }
    }

    pub fn onboarding(event: &str, user_id: i64, username: Option<&str>, state: &str) -> Self {
        Self {
            state: Some(state.to_string()),
            ..Self::base(event, user_id, username)
        }
    }

    pub fn transfer(user_id: i64, username: Option<&str>, file_name: &str, object_id: &str) -> Self {
        Self {
            file_name: Some(file_name.to_string()),
            object_id: Some(object_id.to_string()),
            ..Self::base("transfer", user_id, username)
        }
    }

    pub fn rejected(user_id: i64, username: Option<&str>, reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::base("rejected", user_id, username)
        }
    }

    pub fn error(user_id: i64, username: Option<&str>, kind: &str, error: &str) -> Self {
        Self {
            reason: Some(kind.to_string()),
            error: Some(error.to_string()),
            ..Self::base("error", user_id, username)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        for field in [&mut event.file_name, &mut event.reason, &mut event.error] {
            if let Some(s) = field.take() {
                *field = Some(truncate_text(&s, AUDIT_MAX_TEXT));
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            match v {
                serde_json::Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Audit failures must never break event handling.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.write(event) {
            tracing::warn!(path = %self.path.display(), "failed to write audit event: {e}");
        }
    }
}
