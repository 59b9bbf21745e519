//! 订单服务错误类型

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mesh_shared::error::MeshError;
use thiserror::Error;

use crate::dto::ErrorBody;

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("请求体无效: {0}")]
    InvalidBody(String),

    #[error("发布事件失败: {0}")]
    Publish(#[from] MeshError),
}

impl OrderServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrderServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 发布失败只返回通用提示，详细信息仅记录日志
        let error = match &self {
            Self::Publish(e) => {
                tracing::error!(error = %e, "处理下单请求失败");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<validator::ValidationErrors> for OrderServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<JsonRejection> for OrderServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, OrderServiceError>;
