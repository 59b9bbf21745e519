//! 用户服务
//!
//! 以 `user-service-group` 消费组同时订阅 `user.updated` 与 `order.created`，
//! 两个 topic 共用订单结构，统一按用户更新处理。

pub mod handler;

use mesh_shared::topics;

pub use handler::UserHandler;

pub const SERVICE_NAME: &str = "user-service";

pub const TOPICS: &[&str] = &[topics::USER_UPDATED, topics::ORDER_CREATED];
