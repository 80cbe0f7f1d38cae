//! 本地媒体存储
//!
//! 语音消息负载按 `年/月/uuid.ogg` 落盘，消息行上只存相对路径。
//! 权威的媒体托管是外部协作者，这里只承担服务自身的落盘职责。

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tracing::debug;
use uuid::Uuid;

use bazaar_core::error::{ChatError, Result};

use crate::domain::repository::MediaStore;

pub struct LocalMediaStore {
    root: PathBuf,
    max_bytes: usize,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store_voice(&self, payload: &[u8], now: DateTime<Utc>) -> Result<String> {
        if payload.len() > self.max_bytes {
            return Err(ChatError::validation("voice payload too large"));
        }

        let subdir = format!("{:04}/{:02}", now.year(), now.month());
        let dir = self.root.join(&subdir);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create media dir {}", dir.display()))?;

        let filename = format!("{}.ogg", Uuid::new_v4());
        let path = dir.join(&filename);
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write voice payload {}", path.display()))?;
        let relative = format!("{subdir}/{filename}");

        debug!(path = %path.display(), bytes = payload.len(), "voice payload stored");
        Ok(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn stores_payload_under_dated_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path(), 1024);
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();

        let relative = store.store_voice(b"opus-bytes", now).await.unwrap();
        assert!(relative.starts_with("2025/03/"));
        assert!(relative.ends_with(".ogg"));

        let written = tokio::fs::read(dir.path().join(&relative)).await.unwrap();
        assert_eq!(written, b"opus-bytes");
    }

    #[tokio::test]
    async fn rejects_oversized_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path(), 4);
        let result = store.store_voice(b"way too big", Utc::now()).await;
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }
}
