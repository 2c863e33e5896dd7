use std::path::{Path, PathBuf};

use anyhow::Context;
use ordertrail_core::RawMessage;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ArchivedMessage {
    pub message_id: String,
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Write-once archive of raw messages. Each message is stored as JSON under
/// a path derived from its content hash, so re-archiving is a no-op.
#[derive(Debug, Clone)]
pub struct MessageArchive {
    root: PathBuf,
}

impl MessageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn message_relative_path(
        &self,
        user_id: &str,
        message: &RawMessage,
        content_hash: &str,
    ) -> PathBuf {
        let day = message.received_at.format("%Y%m%d").to_string();
        PathBuf::from(path_segment(user_id))
            .join(day)
            .join(format!("{content_hash}.json"))
    }

    pub async fn store_message(
        &self,
        user_id: &str,
        message: &RawMessage,
    ) -> anyhow::Result<ArchivedMessage> {
        let bytes = serde_json::to_vec_pretty(message)
            .with_context(|| format!("serializing message {}", message.id))?;
        let content_hash = Self::sha256_hex(&bytes);
        let relative_path = self.message_relative_path(user_id, message, &content_hash);
        let absolute_path = self.root.join(&relative_path);
        let archived = |deduplicated| ArchivedMessage {
            message_id: message.id.clone(),
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        let span = info_span!("archive", message_id = %message.id);
        let written = write_once(&absolute_path, &bytes).instrument(span).await?;
        debug!(path = %relative_path.display(), written, "archived message");
        Ok(archived(!written))
    }

    pub async fn read_message(&self, relative_path: &Path) -> anyhow::Result<RawMessage> {
        let path = self.root.join(relative_path);
        let bytes = fs::read(&path)
            .await
            .with_context(|| format!("reading archived message {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing archived message {}", path.display()))
    }
}

/// Atomic temp-file write then rename. Returns false when the target already
/// existed and nothing was written.
async fn write_once(absolute_path: &Path, bytes: &[u8]) -> anyhow::Result<bool> {
    let parent = absolute_path
        .parent()
        .with_context(|| format!("archive path {} has no parent", absolute_path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating archive directory {}", parent.display()))?;

    if fs::try_exists(absolute_path)
        .await
        .with_context(|| format!("checking archive path {}", absolute_path.display()))?
    {
        return Ok(false);
    }

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp archive file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp archive file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp archive file {}", temp_path.display()))?;
    drop(file);

    match fs::rename(&temp_path, absolute_path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let _ = fs::remove_file(&temp_path).await;
            Ok(false)
        }
        Err(err) => {
            let _ = fs::remove_file(&temp_path).await;
            Err(err).with_context(|| {
                format!(
                    "atomically renaming temp archive {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            })
        }
    }
}

fn path_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned.to_string()
    }
}
