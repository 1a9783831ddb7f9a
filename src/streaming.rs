//! 文件内容流式传输：整文件、Range 分段与 gzip/deflate 压缩。
//!
//! 文件句柄与压缩器都由响应体持有，传输完成、出错或客户端断开时随响应体一起释放。

use async_compression::tokio::bufread::{GzipEncoder, ZlibEncoder};
use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::fmt_http_date;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::StreamError;
use crate::resolver::base_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// 附件下载，不做压缩协商。
    Download,
    /// 内联查看，按客户端偏好压缩。
    View,
}

/// 左闭右开的字节区间。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` 使用闭区间表示。
    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end - 1, file_size)
    }
}

/// 解析 `bytes=<start>-<end>`。
///
/// 非 `bytes` 单位时返回 `None`（忽略该头）。无法解析的边界按默认值处理：
/// 起点为 0，终点为文件末尾。多段请求只取第一段。
pub fn parse_range(value: &str, file_size: u64) -> Option<ByteRange> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    let first = ranges.split(',').next().unwrap_or_default();
    let (start_part, end_part) = first.split_once('-').unwrap_or((first, ""));
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    if start_part.is_empty() && !end_part.is_empty() {
        let range = match end_part.parse::<u64>() {
            Ok(suffix) => ByteRange {
                start: file_size.saturating_sub(suffix),
                end: file_size,
            },
            Err(_) => ByteRange {
                start: 0,
                end: file_size,
            },
        };
        return Some(range);
    }

    let start = start_part.parse::<u64>().unwrap_or(0);
    let end = end_part
        .parse::<u64>()
        .map(|end| end.saturating_add(1))
        .unwrap_or(file_size)
        .min(file_size);
    Some(ByteRange { start, end })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// 按客户端给出的顺序选第一个支持的编码；`q=0` 的条目视为拒绝。
    pub fn negotiate(accept_encoding: Option<&str>) -> Self {
        accept_encoding
            .into_iter()
            .flat_map(|value| value.split(','))
            .filter_map(|item| {
                let mut params = item.split(';');
                let name = params.next()?.trim();
                let refused = params.any(|param| {
                    param
                        .trim()
                        .strip_prefix("q=")
                        .and_then(|q| q.trim().parse::<f32>().ok())
                        .is_some_and(|q| q <= 0.0)
                });
                if refused {
                    return None;
                }
                if name.eq_ignore_ascii_case("gzip") {
                    Some(ContentEncoding::Gzip)
                } else if name.eq_ignore_ascii_case("deflate") {
                    Some(ContentEncoding::Deflate)
                } else {
                    None
                }
            })
            .next()
            .unwrap_or(ContentEncoding::Identity)
    }

    pub fn header_value(self) -> Option<&'static str> {
        match self {
            ContentEncoding::Identity => None,
            ContentEncoding::Gzip => Some("gzip"),
            ContentEncoding::Deflate => Some("deflate"),
        }
    }
}

/// 打开已解析的路径并构造流式响应。
pub async fn stream_file(
    target: &Path,
    request_headers: &HeaderMap,
    mode: StreamMode,
) -> Result<Response, StreamError> {
    let file = File::open(target).await.map_err(|err| {
        debug!(path = %target.display(), error = %err, "open for streaming failed");
        StreamError::NotFound
    })?;
    let metadata = file.metadata().await.map_err(|_| StreamError::NotFound)?;
    if metadata.is_dir() {
        return Err(StreamError::IsDirectory);
    }
    let file_size = metadata.len();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(modified) = metadata.modified() {
        insert_header(
            &mut response_headers,
            header::LAST_MODIFIED,
            &fmt_http_date(modified),
        )?;
    }
    match mode {
        StreamMode::Download => {
            let mime = mime_guess::from_path(target).first_or_octet_stream();
            insert_header(&mut response_headers, header::CONTENT_TYPE, mime.essence_str())?;
            response_headers.insert(
                header::CONTENT_DISPOSITION,
                attachment_disposition(&base_name(target)),
            );
        }
        StreamMode::View => {
            response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        }
    }

    let range = request_headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_range(value, file_size));

    if let Some(range) = range {
        if range.is_empty() {
            return Err(StreamError::RangeNotSatisfiable(file_size));
        }
        let length = range.len();
        debug!(
            path = %target.display(),
            start = range.start,
            end = range.end,
            length,
            "range request accepted"
        );
        let mut file = file;
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|err| StreamError::Internal(err.to_string()))?;
        insert_header(
            &mut response_headers,
            header::CONTENT_RANGE,
            &range.content_range(file_size),
        )?;
        insert_header(
            &mut response_headers,
            header::CONTENT_LENGTH,
            &length.to_string(),
        )?;
        let stream = ReaderStream::new(file.take(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    let encoding = match mode {
        StreamMode::Download => ContentEncoding::Identity,
        StreamMode::View => ContentEncoding::negotiate(
            request_headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|value| value.to_str().ok()),
        ),
    };
    if let Some(value) = encoding.header_value() {
        response_headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(value));
        response_headers.insert(header::VARY, HeaderValue::from_static("accept-encoding"));
    }
    info!(path = %target.display(), size = file_size, ?mode, ?encoding, "stream file");

    let body = match encoding {
        ContentEncoding::Identity => {
            insert_header(
                &mut response_headers,
                header::CONTENT_LENGTH,
                &file_size.to_string(),
            )?;
            AxumBody::from_stream(ReaderStream::new(file))
        }
        ContentEncoding::Gzip => {
            AxumBody::from_stream(ReaderStream::new(GzipEncoder::new(BufReader::new(file))))
        }
        ContentEncoding::Deflate => {
            AxumBody::from_stream(ReaderStream::new(ZlibEncoder::new(BufReader::new(file))))
        }
    };
    Ok((StatusCode::OK, response_headers, body).into_response())
}

fn insert_header(
    headers: &mut HeaderMap,
    name: header::HeaderName,
    value: &str,
) -> Result<(), StreamError> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| StreamError::Internal("响应头构建失败".into()))?;
    headers.insert(name, value);
    Ok(())
}

/// 文件名含非 ASCII 字符时改用 RFC 5987 的 `filename*` 形式。
fn attachment_disposition(file_name: &str) -> HeaderValue {
    // HeaderValue 接受 0x80 以上的字节，必须先按 ASCII 判断。
    let value = if file_name.bytes().all(|b| b.is_ascii() && !b.is_ascii_control()) {
        let quoted = file_name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{quoted}\"")
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            urlencoding::encode(file_name)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::{GzipDecoder, ZlibDecoder};
    use http_body_util::BodyExt;
    use tempfile::tempdir;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).expect("header"));
        }
        map
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes()
            .to_vec()
    }

    #[test]
    fn parse_range_variants() {
        assert_eq!(parse_range("bytes=0-99", 500), Some(ByteRange { start: 0, end: 100 }));
        assert_eq!(parse_range("bytes=-100", 500), Some(ByteRange { start: 400, end: 500 }));
        assert_eq!(parse_range("bytes=450-", 500), Some(ByteRange { start: 450, end: 500 }));
        assert_eq!(parse_range("bytes=10-9999", 500), Some(ByteRange { start: 10, end: 500 }));
        assert_eq!(parse_range("bytes=-9999", 500), Some(ByteRange { start: 0, end: 500 }));
        assert_eq!(parse_range("items=0-1", 500), None);
    }

    #[test]
    fn malformed_bounds_fall_back_to_defaults() {
        assert_eq!(parse_range("bytes=abc-99", 500), Some(ByteRange { start: 0, end: 100 }));
        assert_eq!(parse_range("bytes=5-xyz", 500), Some(ByteRange { start: 5, end: 500 }));
        assert_eq!(parse_range("bytes=-zz", 500), Some(ByteRange { start: 0, end: 500 }));
        assert_eq!(parse_range("bytes=", 500), Some(ByteRange { start: 0, end: 500 }));
    }

    #[test]
    fn negotiation_follows_client_order() {
        assert_eq!(ContentEncoding::negotiate(None), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::negotiate(Some("br, gzip")), ContentEncoding::Gzip);
        assert_eq!(
            ContentEncoding::negotiate(Some("deflate, gzip")),
            ContentEncoding::Deflate
        );
        assert_eq!(
            ContentEncoding::negotiate(Some("gzip;q=0, deflate;q=0.5")),
            ContentEncoding::Deflate
        );
        assert_eq!(ContentEncoding::negotiate(Some("br, identity")), ContentEncoding::Identity);
    }

    #[tokio::test]
    async fn range_returns_requested_slice() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.bin");
        let content = sample(500);
        std::fs::write(&path, &content).expect("write");

        let response = stream_file(
            &path,
            &headers(&[(header::RANGE, "bytes=0-99")]),
            StreamMode::Download,
        )
        .await
        .expect("stream");
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-99/500");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(body_bytes(response).await, content[..100]);
    }

    #[tokio::test]
    async fn suffix_range_returns_tail() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.bin");
        let content = sample(500);
        std::fs::write(&path, &content).expect("write");

        let response = stream_file(
            &path,
            &headers(&[(header::RANGE, "bytes=-100")]),
            StreamMode::View,
        )
        .await
        .expect("stream");
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 400-499/500");
        assert_eq!(body_bytes(response).await, content[400..]);
    }

    #[tokio::test]
    async fn empty_range_is_not_satisfiable() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.bin");
        std::fs::write(&path, sample(10)).expect("write");

        let result = stream_file(
            &path,
            &headers(&[(header::RANGE, "bytes=20-30")]),
            StreamMode::Download,
        )
        .await;
        assert!(matches!(result, Err(StreamError::RangeNotSatisfiable(10))));
    }

    #[tokio::test]
    async fn download_sets_attachment_and_length() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("report.txt");
        std::fs::write(&path, b"hello").expect("write");

        let response = stream_file(
            &path,
            &headers(&[(header::ACCEPT_ENCODING, "gzip")]),
            StreamMode::Download,
        )
        .await
        .expect("stream");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.txt\""
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body_bytes(response).await, b"hello");
    }

    #[tokio::test]
    async fn view_gzip_round_trips() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("big.log");
        let content = "line of text\n".repeat(2000);
        std::fs::write(&path, &content).expect("write");

        let response = stream_file(
            &path,
            &headers(&[(header::ACCEPT_ENCODING, "gzip, deflate")]),
            StreamMode::View,
        )
        .await
        .expect("stream");
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let compressed = body_bytes(response).await;
        let mut decoded = Vec::new();
        GzipDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .await
            .expect("gunzip");
        assert_eq!(decoded, content.as_bytes());
    }

    #[tokio::test]
    async fn view_deflate_round_trips() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("notes.md");
        std::fs::write(&path, b"# notes\nsome words\n").expect("write");

        let response = stream_file(
            &path,
            &headers(&[(header::ACCEPT_ENCODING, "deflate")]),
            StreamMode::View,
        )
        .await
        .expect("stream");
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "deflate");

        let compressed = body_bytes(response).await;
        let mut decoded = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .await
            .expect("inflate");
        assert_eq!(decoded, b"# notes\nsome words\n");
    }

    #[tokio::test]
    async fn missing_file_and_directory_are_reported() {
        let temp = tempdir().expect("tempdir");
        let missing = stream_file(&temp.path().join("nope"), &HeaderMap::new(), StreamMode::View).await;
        assert!(matches!(missing, Err(StreamError::NotFound)));

        let dir = stream_file(temp.path(), &HeaderMap::new(), StreamMode::View).await;
        assert!(matches!(dir, Err(StreamError::IsDirectory)));
    }

    #[test]
    fn disposition_falls_back_for_non_ascii_names() {
        assert_eq!(
            attachment_disposition("a\"b.txt"),
            "attachment; filename=\"a\\\"b.txt\""
        );
        assert_eq!(
            attachment_disposition("报告.txt"),
            "attachment; filename*=UTF-8''%E6%8A%A5%E5%91%8A.txt"
        );
        assert_eq!(
            attachment_disposition("a\tb.txt"),
            "attachment; filename*=UTF-8''a%09b.txt"
        );
    }

    #[tokio::test]
    async fn download_of_non_ascii_name_uses_encoded_filename() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("报告.txt");
        std::fs::write(&path, b"hello").expect("write");

        let response = stream_file(&path, &HeaderMap::new(), StreamMode::Download)
            .await
            .expect("stream");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename*=UTF-8''%E6%8A%A5%E5%91%8A.txt"
        );
    }

    #[tokio::test]
    async fn view_range_is_served_uncompressed() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("big.log");
        let content = "line of text\n".repeat(200);
        std::fs::write(&path, &content).expect("write");

        let response = stream_file(
            &path,
            &headers(&[
                (header::RANGE, "bytes=0-9"),
                (header::ACCEPT_ENCODING, "gzip"),
            ]),
            StreamMode::View,
        )
        .await
        .expect("stream");
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(body_bytes(response).await, content.as_bytes()[..10]);
    }
}
