//! FileKvStore - key ごとに 1 ファイルを持つ永続ストア
//!
//! # 実装詳細
//! - `<data_dir>/<encoded key>.json` に値を保存
//! - 書き込みは一時ファイル → rename で置き換える（途中で落ちても半端なファイルを残さない）
//! - key の英数字と `-` `_` 以外は `%XX` にエンコード（可逆）

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::StoreError;
use crate::ports::KeyValueStore;

const EXTENSION: &str = "json";

pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "opened file store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", encode_key(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, value.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => tracing::warn!(file = %path.display(), "ignoring file with undecodable name"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
