//! 文件列表、查看、下载、上传与修改操作的 HTTP 处理器。

use axum::extract::{Extension, Form, Multipart, Path};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ServerConfig, UPLOAD_FIELD_NAME};
use crate::envelope::Envelope;
use crate::error::{FsError, StreamError};
use crate::listing::{self, Listing};
use crate::mutation::{self, EditDocument, FileInfo, UploadedFile};
use crate::resolver::PathResolver;
use crate::sort::{SortKey, SortSpec};
use crate::streaming::{StreamMode, stream_file};

#[derive(Deserialize)]
pub(crate) struct SaveForm {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
pub(crate) struct RenameForm {
    to: String,
}

#[derive(Debug, Serialize)]
pub struct IndexInfo {
    dir: String,
    prefix: String,
}

/// 首页数据：初始目录与 URL 前缀。
pub async fn index(Extension(config): Extension<Arc<ServerConfig>>) -> Envelope<IndexInfo> {
    Envelope::success(IndexInfo {
        dir: config.first_dir.clone(),
        prefix: config.prefix.clone(),
    })
}

/// 按名称升序列出目录。
pub async fn simple_list(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Response, FsError> {
    let listing = listing::list(&resolver, &path, SortSpec::default()).await?;
    Ok(listing_response(listing))
}

/// 按指定键与方向列出目录。
pub async fn sorted_list(
    Path((order_by, is_asc, path)): Path<(String, bool, String)>,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Response, FsError> {
    let spec = SortSpec {
        key: order_by.parse::<SortKey>()?,
        ascending: is_asc,
    };
    let listing = listing::list(&resolver, &path, spec).await?;
    Ok(listing_response(listing))
}

/// 列出路径的上一级目录。
pub async fn list_up(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Response, FsError> {
    let listing = listing::list_parent(&resolver, &path).await?;
    Ok(listing_response(listing))
}

fn listing_response(listing: Listing) -> Response {
    match listing {
        Listing::Folder(folder) => Envelope::success(folder).into_response(),
        Listing::File(path) => Envelope::message(format!("file:{}", path.display())).into_response(),
    }
}

pub async fn make_dirs(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Envelope<String>, FsError> {
    mutation::make_dirs(&resolver, &path).await?;
    Ok(Envelope::ok())
}

pub async fn remove(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Envelope<String>, FsError> {
    mutation::remove(&resolver, &path).await?;
    Ok(Envelope::ok())
}

pub async fn rename(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
    Form(RenameForm { to }): Form<RenameForm>,
) -> Result<Envelope<String>, FsError> {
    mutation::rename(&resolver, &path, &to).await?;
    Ok(Envelope::ok())
}

pub async fn save(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
    Form(SaveForm { content }): Form<SaveForm>,
) -> Result<Envelope<String>, FsError> {
    mutation::save(&resolver, &path, content.as_bytes()).await?;
    Ok(Envelope::ok())
}

/// 接收 multipart 中的 `uploaded_file` 部分并写入目标目录。
pub async fn upload(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
    multipart: Multipart,
) -> Result<Envelope<String>, FsError> {
    let file = read_uploaded_file(multipart).await?;
    mutation::upload(&resolver, &path, file).await?;
    Ok(Envelope::ok())
}

async fn read_uploaded_file(mut multipart: Multipart) -> Result<UploadedFile, FsError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| FsError::Upload(err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            debug!(field = ?field.name(), "skip multipart field");
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| FsError::Upload("missing file name".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|err| FsError::Upload(err.body_text()))?;
        return Ok(UploadedFile {
            file_name,
            data: data.to_vec(),
        });
    }
    Err(FsError::Upload(format!("no {UPLOAD_FIELD_NAME} part")))
}

pub async fn info(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Envelope<FileInfo>, FsError> {
    Ok(Envelope::success(mutation::get_info(&resolver, &path).await?))
}

pub async fn on_edit(
    Path(path): Path<String>,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Envelope<EditDocument>, FsError> {
    Ok(Envelope::success(
        mutation::read_for_edit(&resolver, &path).await?,
    ))
}

/// 以附件形式下载文件，支持 Range。
pub async fn download(
    Path(path): Path<String>,
    request_headers: HeaderMap,
    Extension(resolver): Extension<Arc<PathResolver>>,
) -> Result<Response, StreamError> {
    let target = resolver.resolve_for_access(&path);
    info!(path = %target.display(), "download");
    stream_file(&target, &request_headers, StreamMode::Download).await
}

/// 内联查看文件；目标是目录时跳转到对应的列表页。
pub async fn view(
    Path(path): Path<String>,
    request_headers: HeaderMap,
    Extension(resolver): Extension<Arc<PathResolver>>,
    Extension(config): Extension<Arc<ServerConfig>>,
) -> Result<Response, StreamError> {
    let target = resolver.resolve_for_access(&path);
    match stream_file(&target, &request_headers, StreamMode::View).await {
        Err(StreamError::IsDirectory) => {
            let location = config.route(&format!("/fs/list/{}", encode_path(&path)));
            debug!(path = %target.display(), location, "view target is a directory");
            Ok(Redirect::to(&location).into_response())
        }
        other => other,
    }
}

/// 按段进行百分号编码，保留 `/`。
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
