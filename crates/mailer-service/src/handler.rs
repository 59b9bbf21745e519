//! 订单通知处理器

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use mesh_shared::events::MeshEvent;
use mesh_shared::handler::{EventContext, EventHandler, HandlerError};
use tracing::info;

use crate::template::OrderSummary;

/// 为每条订单事件发送邮件通知
///
/// 目前只把摘要写入日志，永远返回成功。
#[derive(Debug, Default)]
pub struct MailerHandler {
    sent: AtomicU64,
}

impl MailerHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发送的通知数
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for MailerHandler {
    fn name(&self) -> &'static str {
        "mailer"
    }

    async fn handle(&self, ctx: &EventContext, event: &MeshEvent) -> Result<(), HandlerError> {
        let order = event.order();
        info!(
            order_id = %order.order_id,
            partition = ctx.partition,
            offset = ctx.offset,
            "Sending email notification"
        );

        let summary = OrderSummary::from_order(order);
        info!(order_id = %order.order_id, "\n{summary}");

        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
