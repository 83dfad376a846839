//! LocalDirGateway - ローカルディレクトリをオブジェクトストアとして扱う
//!
//! キー `input1/report.csv` は `<root>/input1/report.csv` に対応します。
//! ワーカーを同じマシンで動かす開発環境や、共有ボリューム越しの連携向け。
//!
//! - put は一時ファイルに書いてから rename（list に書きかけが見えない）
//! - `..` や絶対パスを含むキーは Denied

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use crate::ports::{GatewayError, ObjectInfo, StorageGateway, StorageOp};

const TMP_PREFIX: &str = ".relay-tmp-";

#[derive(Debug, Clone)]
pub struct LocalDirGateway {
    root: PathBuf,
}

impl LocalDirGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, op: StorageOp, key: &str) -> Result<PathBuf, GatewayError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(GatewayError::denied(op, format!("key escapes store root: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

fn map_io(op: StorageOp, key: &str, err: io::Error) -> GatewayError {
    match err.kind() {
        io::ErrorKind::NotFound => GatewayError::not_found(key),
        io::ErrorKind::PermissionDenied => GatewayError::denied(op, format!("{key}: {err}")),
        _ => GatewayError::transient(op, format!("{key}: {err}")),
    }
}

/// `<root>` からの相対パスを `/` 区切りのキーに
fn key_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    Some(parts?.join("/"))
}

#[async_trait]
impl StorageGateway for LocalDirGateway {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), GatewayError> {
        let path = self.path_for(StorageOp::Put, key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .await
            .map_err(|e| map_io(StorageOp::Put, key, e))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        let tmp = parent.join(format!("{TMP_PREFIX}{}-{file_name}", ulid::Ulid::new()));
        fs::write(&tmp, data)
            .await
            .map_err(|e| map_io(StorageOp::Put, key, e))?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(map_io(StorageOp::Put, key, err));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let path = self.path_for(StorageOp::Get, key)?;
        fs::read(&path)
            .await
            .map_err(|e| map_io(StorageOp::Get, key, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, GatewayError> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // root がまだ無い = 空のストア
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(map_io(StorageOp::List, prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| map_io(StorageOp::List, prefix, e))?
            {
                let path = entry.path();
                let name = entry.file_name();
                if name.to_str().is_some_and(|n| n.starts_with(TMP_PREFIX)) {
                    continue;
                }
                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    // list 中に消えたものは無視
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(map_io(StorageOp::List, prefix, e)),
                };
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = key_for(&self.root, &path) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }
                let mut info = ObjectInfo::new(key, metadata.len());
                if let Ok(modified) = metadata.modified() {
                    info = info.modified_at(DateTime::<Utc>::from(modified));
                }
                objects.push(info);
            }
        }

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn gateway() -> (tempfile::TempDir, LocalDirGateway) {
        let dir = tempfile::tempdir().unwrap();
        let gw = LocalDirGateway::new(dir.path());
        (dir, gw)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_dir, gw) = gateway();
        gw.put("input1/report.csv", b"a,b\n").await.unwrap();
        assert_eq!(gw.get("input1/report.csv").await.unwrap(), b"a,b\n");
    }

    #[tokio::test]
    async fn put_overwrites() {
        let (_dir, gw) = gateway();
        gw.put("input1/a.txt", b"one").await.unwrap();
        gw.put("input1/a.txt", b"two").await.unwrap();
        assert_eq!(gw.get("input1/a.txt").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn list_returns_nested_keys_under_prefix() {
        let (_dir, gw) = gateway();
        gw.put("input1/report.csv", b"1").await.unwrap();
        gw.put("input1/sub/report.json", b"22").await.unwrap();
        gw.put("other/report.json", b"333").await.unwrap();

        let mut listed = gw.list("input1/").await.unwrap();
        listed.sort_by(|a, b| a.key.cmp(&b.key));

        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["input1/report.csv", "input1/sub/report.json"]);
        assert_eq!(listed[1].size, 2);
        assert!(listed.iter().all(|o| o.last_modified.is_some()));
    }

    #[tokio::test]
    async fn list_of_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gw = LocalDirGateway::new(dir.path().join("not-yet"));
        assert!(gw.list("input1/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, gw) = gateway();
        let err = gw.get("input1/none.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[rstest]
    #[case("../escape.txt")]
    #[case("input1/../../escape.txt")]
    #[case("/etc/passwd")]
    #[case("")]
    #[tokio::test]
    async fn keys_outside_root_are_denied(#[case] key: &str) {
        let (_dir, gw) = gateway();
        let err = gw.put(key, b"x").await.unwrap_err();
        assert!(matches!(err, GatewayError::Denied { op: StorageOp::Put, .. }));
    }
}
