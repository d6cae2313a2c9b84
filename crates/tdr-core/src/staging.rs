//! Scratch directory for in-flight transfers.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::Result;

/// Longest sanitized name kept in a staging path, well under the usual
/// 255-byte file name limit once the counter prefix is added.
const MAX_STAGED_NAME: usize = 100;
const MAX_KEPT_EXTENSION: usize = 16;

pub struct StagingArea {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicUsize::new(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and drop anything a previous (aborted) process
    /// left behind. Returns the number of stale entries removed.
    pub async fn prepare(&self) -> Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut removed = 0usize;
        let mut rd = tokio::fs::read_dir(&self.dir).await?;
        while let Some(ent) = rd.next_entry().await? {
            let path = ent.path();
            let res = if ent.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match res {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), "stale staging entry not removed: {e}"),
            }
        }
        if removed > 0 {
            tracing::info!(dir = %self.dir.display(), removed, "cleaned stale staging files");
        }
        Ok(removed)
    }

    /// Reserve a unique staging path derived from `file_name`.
    pub async fn stage(&self, file_name: &str) -> Result<StagedFile> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("{n}_{}", staged_name(file_name)));
        Ok(StagedFile {
            path,
            released: false,
        })
    }
}

/// A staging artifact. Removed by [`StagedFile::release`] or, failing that,
/// when dropped (error paths, panics, cancelled handlers).
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "failed to remove staging file: {e}");
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "failed to remove staging file: {e}");
            }
        }
    }
}

pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let out = out.trim_start_matches('.').to_string();
    if out.is_empty() {
        "file".to_string()
    } else {
        out
    }
}

/// Sanitized and length-capped, keeping a short extension intact.
fn staged_name(file_name: &str) -> String {
    // Sanitized output is ASCII, so byte slicing is char-safe.
    let name = sanitize_filename(file_name);
    if name.len() <= MAX_STAGED_NAME {
        return name;
    }
    let ext = name
        .rfind('.')
        .map(|i| &name[i..])
        .filter(|e| e.len() <= MAX_KEPT_EXTENSION)
        .unwrap_or("");
    let stem = &name[..name.len() - ext.len()];
    format!("{}{ext}", &stem[..MAX_STAGED_NAME - ext.len()])
}
