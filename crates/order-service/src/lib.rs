//! 订单服务
//!
//! 提供下单 REST API，把订单发布为 `order.created` 事件，
//! 请求要求时同时发布 `user.updated` 事件。
//!
//! ## 模块结构
//!
//! - `dto`: 请求与错误响应结构
//! - `error`: 错误类型及其 HTTP 映射
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `service`: 发布逻辑
//! - `state`: 应用状态

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;

pub use dto::OrderRequest;
pub use error::{OrderServiceError, Result};
pub use service::OrderService;
pub use state::AppState;
