//! Keyed persistence of per-user onboarding state.
//!
//! Every write is an upsert keyed by [`UserId`]; concurrent first-contact
//! events converge to one record and each field write is atomic on its own.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{credential::Credential, domain::UserId, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
}

impl UserRecord {
    pub fn new(user_id: UserId, display_name: Option<String>) -> Self {
        Self {
            user_id,
            display_name,
            credential: None,
            destination_id: None,
        }
    }
}

/// Result of [`UserStore::ensure_exists`].
#[derive(Clone, Debug)]
pub struct Ensured {
    pub record: UserRecord,
    /// `true` only for the call that actually inserted the record.
    pub created: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<UserRecord>>;

    /// Create the record if absent. On an existing id this is a plain read.
    async fn ensure_exists(&self, user_id: UserId, display_name: Option<&str>) -> Result<Ensured>;

    async fn upsert_credential(&self, user_id: UserId, credential: Credential) -> Result<()>;

    async fn upsert_destination(&self, user_id: UserId, destination_id: &str) -> Result<()>;
}

type Records = BTreeMap<UserId, UserRecord>;

fn ensure_in(records: &mut Records, user_id: UserId, display_name: Option<&str>) -> Ensured {
    if let Some(existing) = records.get(&user_id) {
        return Ensured {
            record: existing.clone(),
            created: false,
        };
    }
    let record = UserRecord::new(user_id, display_name.map(str::to_string));
    records.insert(user_id, record.clone());
    Ensured {
        record,
        created: true,
    }
}

fn entry(records: &mut Records, user_id: UserId) -> &mut UserRecord {
    records
        .entry(user_id)
        .or_insert_with(|| UserRecord::new(user_id, None))
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryUserStore {
    records: Mutex<Records>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.records.lock().await.get(&user_id).cloned())
    }

    async fn ensure_exists(&self, user_id: UserId, display_name: Option<&str>) -> Result<Ensured> {
        Ok(ensure_in(&mut *self.records.lock().await, user_id, display_name))
    }

    async fn upsert_credential(&self, user_id: UserId, credential: Credential) -> Result<()> {
        entry(&mut *self.records.lock().await, user_id).credential = Some(credential);
        Ok(())
    }

    async fn upsert_destination(&self, user_id: UserId, destination_id: &str) -> Result<()> {
        entry(&mut *self.records.lock().await, user_id).destination_id =
            Some(destination_id.to_string());
        Ok(())
    }
}

#[derive(Default, Serialize, Deserialize)]
struct StoreFile {
    users: Vec<UserRecord>,
}

/// Single-document JSON store.
///
/// All records are held in memory and the whole document is rewritten
/// (temp file + rename) after each mutation, while the lock is held.
pub struct JsonFileUserStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonFileUserStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Records::new(),
            Ok(bytes) => {
                let file: StoreFile = serde_json::from_slice(&bytes)?;
                file.users.into_iter().map(|r| (r.user_id, r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), users = records.len(), "user store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &Records) -> Result<()> {
        let doc = StoreFile {
            users: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for JsonFileUserStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.records.lock().await.get(&user_id).cloned())
    }

    async fn ensure_exists(&self, user_id: UserId, display_name: Option<&str>) -> Result<Ensured> {
        let mut records = self.records.lock().await;
        let out = ensure_in(&mut records, user_id, display_name);
        if out.created {
            if let Err(e) = self.persist(&records).await {
                records.remove(&user_id);
                return Err(e);
            }
        }
        Ok(out)
    }

    async fn upsert_credential(&self, user_id: UserId, credential: Credential) -> Result<()> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        entry(&mut next, user_id).credential = Some(credential);
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn upsert_destination(&self, user_id: UserId, destination_id: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        entry(&mut next, user_id).destination_id = Some(destination_id.to_string());
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }
}
