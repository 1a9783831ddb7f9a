//! 目录列表：读取子项元数据、排序并组装目录描述。

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::FsError;
use crate::resolver::{PathResolver, base_name, parent_or_self};
use crate::sort::{SortSpec, sort_entries};

/// 目录中一个子项在读取时刻的元数据快照。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    #[serde(serialize_with = "serialize_mod_time")]
    pub mod_time: SystemTime,
    pub mode: String,
}

impl DirectoryEntry {
    pub fn from_metadata(name: String, metadata: &Metadata) -> Self {
        Self {
            name,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            mod_time: metadata.modified().unwrap_or(UNIX_EPOCH),
            mode: mode_string(metadata),
        }
    }
}

/// 目录列表的响应载荷，字段名与网页端约定保持一致。
#[derive(Debug, Serialize)]
pub struct FolderDescriptor {
    #[serde(rename = "BaseName")]
    pub base_name: String,
    /// 被列出目录的上两级目录，网页端的“向上”导航依赖这一约定。
    #[serde(rename = "Dir")]
    pub parent_display_path: String,
    #[serde(rename = "Folder")]
    pub display_path: String,
    #[serde(rename = "Files")]
    pub entries: Vec<DirectoryEntry>,
}

#[derive(Debug)]
pub enum Listing {
    Folder(FolderDescriptor),
    /// 目标是普通文件，调用方据此跳转到其所在目录。
    File(PathBuf),
}

/// 列出路径片段指向的目录。
pub async fn list(
    resolver: &PathResolver,
    token: &str,
    spec: SortSpec,
) -> Result<Listing, FsError> {
    let target = resolver.resolve_for_access(token);
    let metadata = fs::metadata(&target)
        .await
        .map_err(|err| FsError::open(&target, err))?;
    if !metadata.is_dir() {
        debug!(path = %target.display(), "listing target is a file");
        return Ok(Listing::File(target));
    }

    let mut entries = read_entries(&target).await?;
    sort_entries(&mut entries, spec);
    info!(
        path = %target.display(),
        count = entries.len(),
        key = ?spec.key,
        ascending = spec.ascending,
        "list directory"
    );

    Ok(Listing::Folder(FolderDescriptor {
        base_name: base_name(&target),
        parent_display_path: parent_or_self(&parent_or_self(&target))
            .to_string_lossy()
            .into_owned(),
        display_path: resolver.resolve_for_display(token),
        entries,
    }))
}

/// 列出路径所在的上一级目录（按名称升序）。
pub async fn list_parent(resolver: &PathResolver, token: &str) -> Result<Listing, FsError> {
    let parent = parent_or_self(&resolver.resolve_for_access(token));
    debug!(token, parent = %parent.display(), "list parent");
    list(resolver, &parent.to_string_lossy(), SortSpec::default()).await
}

/// 读取目录的全部直接子项（不分页）。
pub async fn read_entries(dir: &Path) -> Result<Vec<DirectoryEntry>, FsError> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|err| FsError::open(dir, err))?;
    let mut entries = Vec::new();

    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|err| FsError::os("readdir", dir, err))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        // 读目录与 stat 之间子项可能已被删除。
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(name, error = %err, "skip unreadable entry");
                continue;
            }
        };
        entries.push(DirectoryEntry::from_metadata(name, &metadata));
    }

    Ok(entries)
}

fn serialize_mod_time<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_mod_time(*time))
}

pub fn format_mod_time(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%a %b %e %H:%M:%S UTC %Y").to_string()
}

#[cfg(unix)]
fn mode_string(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    let mut out = String::with_capacity(10);
    out.push(if metadata.is_dir() {
        'd'
    } else if metadata.file_type().is_symlink() {
        'L'
    } else {
        '-'
    });
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn mode_string(metadata: &Metadata) -> String {
    let kind = if metadata.is_dir() { 'd' } else { '-' };
    let perms = if metadata.permissions().readonly() {
        "r--r--r--"
    } else {
        "rw-rw-rw-"
    };
    format!("{kind}{perms}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::SortKey;
    use std::time::Duration;
    use tempfile::tempdir;

    fn names(listing: &Listing) -> Vec<&str> {
        match listing {
            Listing::Folder(folder) => folder.entries.iter().map(|e| e.name.as_str()).collect(),
            Listing::File(_) => panic!("expected folder"),
        }
    }

    #[tokio::test]
    async fn lists_directory_sorted_with_descriptor_fields() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("outer").join("inner");
        std::fs::create_dir_all(root.join("Zeta")).expect("mkdir");
        std::fs::write(root.join("b.txt"), b"12345").expect("write");
        std::fs::write(root.join("A.txt"), b"1").expect("write");

        let resolver = PathResolver::new();
        let token = root.to_string_lossy().into_owned();
        let listing = list(&resolver, &token, SortSpec::default())
            .await
            .expect("list");
        assert_eq!(names(&listing), ["Zeta", "A.txt", "b.txt"]);

        let Listing::Folder(folder) = listing else {
            panic!("expected folder");
        };
        assert_eq!(folder.base_name, "inner");
        assert_eq!(folder.display_path, token);
        assert_eq!(
            folder.parent_display_path,
            temp.path().to_string_lossy().into_owned()
        );
        let zeta = &folder.entries[0];
        assert!(zeta.is_dir);
        assert!(zeta.mode.starts_with('d'));
        assert_eq!(folder.entries[2].size, 5);
    }

    #[tokio::test]
    async fn size_sort_descending_puts_files_first() {
        let temp = tempdir().expect("tempdir");
        std::fs::create_dir(temp.path().join("dir")).expect("mkdir");
        std::fs::write(temp.path().join("small"), b"1").expect("write");
        std::fs::write(temp.path().join("large"), b"1234567890").expect("write");

        let resolver = PathResolver::new();
        let spec = SortSpec {
            key: SortKey::Size,
            ascending: false,
        };
        let listing = list(&resolver, &temp.path().to_string_lossy(), spec)
            .await
            .expect("list");
        assert_eq!(names(&listing), ["large", "small", "dir"]);
    }

    #[tokio::test]
    async fn file_target_returns_file_marker() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("note.txt");
        std::fs::write(&file, b"hi").expect("write");

        let resolver = PathResolver::new();
        let listing = list(&resolver, &file.to_string_lossy(), SortSpec::default())
            .await
            .expect("list");
        assert!(matches!(listing, Listing::File(path) if path == file));
    }

    #[tokio::test]
    async fn missing_path_reports_original_path() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("missing");
        let resolver = PathResolver::new();
        let err = list(&resolver, &missing.to_string_lossy(), SortSpec::default())
            .await
            .expect_err("missing dir");
        let message = err.to_string();
        assert!(message.starts_with("Failed to open file: "));
        assert!(message.contains(&*missing.to_string_lossy()));
    }

    #[tokio::test]
    async fn list_parent_lists_containing_directory() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("child.txt");
        std::fs::write(&file, b"x").expect("write");

        let resolver = PathResolver::new();
        let listing = list_parent(&resolver, &file.to_string_lossy())
            .await
            .expect("list parent");
        assert_eq!(names(&listing), ["child.txt"]);
    }

    #[test]
    fn mod_time_uses_unix_date_layout() {
        let time = UNIX_EPOCH + Duration::from_secs(86_400 * 365);
        assert_eq!(format_mod_time(time), "Fri Jan  1 00:00:00 UTC 1971");
    }
}
