//! 邮件通知服务
//!
//! 以 `mailer-service-group` 消费组订阅 `order.created`，
//! 为每笔订单生成通知摘要并模拟发送邮件。

pub mod handler;
pub mod template;

use mesh_shared::topics;

pub use handler::MailerHandler;

pub const SERVICE_NAME: &str = "mailer-service";

/// 订阅的 topic 列表
pub const TOPICS: &[&str] = &[topics::ORDER_CREATED];
