use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram user id (numeric). Primary key of the user record store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram message id (numeric), unique within a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Opaque handle for an inbound file, as issued by the source transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileRef(pub String);

/// Where the source transport serves a resolved file from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteLocator {
    pub path: String,
    pub size: Option<u64>,
}

/// Identifier of an object created in the destination service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId(pub String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
