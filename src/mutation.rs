//! 文件修改与查询操作：建目录、删除、重命名、保存、上传、元数据与编辑读取。
//!
//! 每个操作先解析路径，再执行一次文件系统调用；不加锁，并发冲突由文件系统本身决定。

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::FsError;
use crate::listing::DirectoryEntry;
use crate::resolver::{PathResolver, base_name, normalize, parent_or_self};

/// 单个文件的元数据。
#[derive(Debug, Serialize)]
pub struct FileInfo {
    #[serde(flatten)]
    pub entry: DirectoryEntry,
    #[serde(rename = "Path")]
    pub path: String,
}

/// 编辑页面需要的文件内容与位置。
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EditDocument {
    pub content: String,
    pub file_path: String,
    pub folder: String,
    pub base_name: String,
}

/// 一个已经完整读入内存的上传文件。
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

pub async fn make_dirs(resolver: &PathResolver, token: &str) -> Result<(), FsError> {
    let target = resolver.resolve_for_access(token);
    fs::create_dir_all(&target)
        .await
        .map_err(|err| FsError::os("mkdir", &target, err))?;
    info!(path = %target.display(), "make dirs");
    Ok(())
}

/// 删除文件或空目录。
pub async fn remove(resolver: &PathResolver, token: &str) -> Result<(), FsError> {
    let target = resolver.resolve_for_access(token);
    let metadata = fs::symlink_metadata(&target)
        .await
        .map_err(|err| FsError::os("remove", &target, err))?;
    let result = if metadata.is_dir() {
        fs::remove_dir(&target).await
    } else {
        fs::remove_file(&target).await
    };
    result.map_err(|err| FsError::os("remove", &target, err))?;
    info!(path = %target.display(), "remove");
    Ok(())
}

pub async fn rename(resolver: &PathResolver, from: &str, to: &str) -> Result<(), FsError> {
    let source = resolver.resolve_for_access(from);
    let destination = resolver.resolve_for_access(to);
    match fs::try_exists(&source).await {
        Ok(true) => {}
        Ok(false) => return Err(FsError::NotFound(source)),
        Err(err) => return Err(FsError::os("rename", &source, err)),
    }
    fs::rename(&source, &destination)
        .await
        .map_err(|err| FsError::os("rename", &source, err))?;
    info!(from = %source.display(), to = %destination.display(), "rename");
    Ok(())
}

/// 覆盖写入（不存在则创建）。
pub async fn save(resolver: &PathResolver, token: &str, content: &[u8]) -> Result<(), FsError> {
    let target = resolver.resolve_for_access(token);
    fs::write(&target, content)
        .await
        .map_err(|err| FsError::os("save", &target, err))?;
    info!(path = %target.display(), size = content.len(), "save");
    Ok(())
}

/// 把上传文件写到目标目录下，文件名不做清理。
pub async fn upload(
    resolver: &PathResolver,
    parent_token: &str,
    file: UploadedFile,
) -> Result<PathBuf, FsError> {
    let parent = resolver.resolve_for_access(parent_token);
    let target = upload_target(&parent, &file.file_name);
    fs::write(&target, &file.data)
        .await
        .map_err(|err| FsError::os("upload", &target, err))?;
    info!(path = %target.display(), size = file.data.len(), "upload");
    Ok(target)
}

fn upload_target(parent: &Path, file_name: &str) -> PathBuf {
    normalize(&parent.join(file_name.trim_start_matches(['/', '\\'])))
}

pub async fn get_info(resolver: &PathResolver, token: &str) -> Result<FileInfo, FsError> {
    let target = resolver.resolve_for_access(token);
    let metadata = fs::metadata(&target)
        .await
        .map_err(|err| FsError::os("stat", &target, err))?;
    Ok(FileInfo {
        entry: DirectoryEntry::from_metadata(base_name(&target), &metadata),
        path: target.to_string_lossy().into_owned(),
    })
}

/// 读取整个文件供编辑，非 UTF-8 内容按有损方式转换。
pub async fn read_for_edit(resolver: &PathResolver, token: &str) -> Result<EditDocument, FsError> {
    let target = resolver.resolve_for_access(token);
    let metadata = fs::metadata(&target)
        .await
        .map_err(|err| FsError::open(&target, err))?;
    if metadata.is_dir() {
        return Err(FsError::NotAFile(target));
    }
    let bytes = fs::read(&target)
        .await
        .map_err(|err| FsError::open(&target, err))?;
    Ok(EditDocument {
        content: String::from_utf8_lossy(&bytes).into_owned(),
        file_path: resolver.resolve_for_display(&target.to_string_lossy()),
        folder: parent_or_self(&target).to_string_lossy().into_owned(),
        base_name: base_name(&target),
    })
}
