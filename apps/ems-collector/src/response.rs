//! 状态接口的响应封装：`{ success, data | error }`。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// 200 + data。
pub fn ok<T: Serialize>(data: T) -> Response {
    let body = ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn failure(status: StatusCode, code: &'static str, message: String) -> Response {
    let body = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(ErrorBody { code, message }),
    };
    (status, Json(body)).into_response()
}

/// 设备未被调度（未配置、被剔除或已移除）。
pub fn device_not_found(device_id: &str) -> Response {
    failure(
        StatusCode::NOT_FOUND,
        "DEVICE.NOT_FOUND",
        format!("device {} is not scheduled", device_id),
    )
}
