//! 统一的错误类型：JSON 操作错误与流式传输错误。

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::envelope::Envelope;

/// JSON 接口的失败原因，最终以失败信封返回。
#[derive(Debug)]
pub enum FsError {
    Open { path: PathBuf, source: io::Error },
    NotFound(PathBuf),
    NotAFile(PathBuf),
    InvalidSortKey(String),
    Upload(String),
    Os {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl FsError {
    pub fn open(path: &Path, source: io::Error) -> Self {
        FsError::Open {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn os(op: &'static str, path: &Path, source: io::Error) -> Self {
        FsError::Os {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::Open { path, source } => {
                write!(f, "Failed to open file: {}: {source}", path.display())
            }
            FsError::NotFound(path) => write!(f, "{}: no such file or directory", path.display()),
            FsError::NotAFile(path) => write!(f, "{}: is not a file", path.display()),
            FsError::InvalidSortKey(key) => write!(f, "unknown sort key: {key}"),
            FsError::Upload(msg) => write!(f, "upload failed: {msg}"),
            FsError::Os { op, path, source } => write!(f, "{op} {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Open { source, .. } | FsError::Os { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl IntoResponse for FsError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "operation failed");
        Envelope::failure(self.to_string()).into_response()
    }
}

/// 流式传输错误：浏览器可能直接访问资源，因此返回纯文本而不是 JSON。
#[derive(Debug)]
pub enum StreamError {
    NotFound,
    IsDirectory,
    RangeNotSatisfiable(u64),
    Internal(String),
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        match self {
            StreamError::NotFound | StreamError::IsDirectory => {
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            StreamError::RangeNotSatisfiable(size) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    headers,
                    "range not satisfiable",
                )
                    .into_response()
            }
            StreamError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}
