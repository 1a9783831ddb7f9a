//! JSON 信封：`{"success": bool, "msg": ...}`。

use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    msg: T,
}

impl<T: Serialize> Envelope<T> {
    /// 携带结构化数据的成功响应。
    pub fn success(payload: T) -> Self {
        Self {
            success: true,
            msg: payload,
        }
    }
}

impl Envelope<String> {
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            msg: msg.into(),
        }
    }

    /// 空消息的成功响应，用于各类修改操作。
    pub fn ok() -> Self {
        Self::message(String::new())
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: msg.into(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        JsonResponse(self).into_response()
    }
}
