use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_MIN_FOLDER_ID_LEN: usize = 20;
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DEFAULT_SHARE_BASE: &str = "https://drive.google.com";

/// Typed configuration, loaded from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_allowed_users: Vec<i64>,

    // Local state
    pub staging_dir: PathBuf,
    pub user_store_path: PathBuf,

    // Onboarding
    pub min_folder_id_len: usize,
    pub max_credential_bytes: u64,

    // Destination service
    pub drive_upload_base: String,
    pub share_base: String,

    // Network
    pub http_timeout: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));

        let staging_dir = env_path("TDR_STAGING_DIR")
            .unwrap_or_else(|| PathBuf::from("/tmp/tele-drive-relay/downloads"));
        let user_store_path = env_path("TDR_USER_STORE")
            .unwrap_or_else(|| PathBuf::from("/tmp/tele-drive-relay/users.json"));

        let min_folder_id_len =
            env_usize("TDR_MIN_FOLDER_ID_LEN").unwrap_or(DEFAULT_MIN_FOLDER_ID_LEN);
        let max_credential_bytes = env_u64("TDR_MAX_CREDENTIAL_BYTES").unwrap_or(64 * 1024);

        let drive_upload_base = env_str("TDR_DRIVE_UPLOAD_BASE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_UPLOAD_BASE.to_string());
        let share_base = env_str("TDR_SHARE_BASE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_SHARE_BASE.to_string());

        let http_timeout = Duration::from_secs(env_u64("TDR_HTTP_TIMEOUT_SECS").unwrap_or(120));

        let audit_log_path = env_path("TDR_AUDIT_LOG")
            .unwrap_or_else(|| PathBuf::from("/tmp/tele-drive-relay/audit.log"));
        let audit_log_json = env_bool("TDR_AUDIT_LOG_JSON").unwrap_or(false);

        fs::create_dir_all(&staging_dir)?;
        for p in [&user_store_path, &audit_log_path] {
            if let Some(parent) = p.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            staging_dir,
            user_store_path,
            min_folder_id_len,
            max_credential_bytes,
            drive_upload_base,
            share_base,
            http_timeout,
            audit_log_path,
            audit_log_json,
        })
    }

    /// An empty allow-list means the bot is open to everyone.
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.telegram_allowed_users.is_empty() || self.telegram_allowed_users.contains(&user_id)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_ids_skip_garbage() {
        assert_eq!(
            parse_csv_i64(Some(" 1, x,,42 ".to_string())),
            vec![1, 42]
        );
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"abc'"), "\"abc'");
        assert_eq!(unquote("abc"), "abc");
    }

    #[test]
    fn empty_allow_list_is_public() {
        let mut cfg = Config {
            telegram_bot_token: "x".to_string(),
            telegram_allowed_users: vec![],
            staging_dir: "/tmp".into(),
            user_store_path: "/tmp/u.json".into(),
            min_folder_id_len: DEFAULT_MIN_FOLDER_ID_LEN,
            max_credential_bytes: 1024,
            drive_upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            share_base: DEFAULT_SHARE_BASE.to_string(),
            http_timeout: Duration::from_secs(1),
            audit_log_path: "/tmp/a.log".into(),
            audit_log_json: false,
        };
        assert!(cfg.is_user_allowed(7));

        cfg.telegram_allowed_users = vec![1];
        assert!(cfg.is_user_allowed(1));
        assert!(!cfg.is_user_allowed(7));
    }
}
