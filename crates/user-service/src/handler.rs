//! 用户更新处理器

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use mesh_shared::events::MeshEvent;
use mesh_shared::handler::{EventContext, EventHandler, HandlerError};
use tracing::{debug, info};

/// 默认最多单独计数的用户数
pub const DEFAULT_TRACKED_USERS: usize = 10_000;

/// 按用户聚合的更新计数
///
/// 诊断用计数器，随进程存活。单独计数的邮箱数量有上限，
/// 超出上限的新用户只计入总数。
#[derive(Debug)]
pub struct UserHandler {
    updates: DashMap<String, u64>,
    max_tracked: usize,
    untracked: AtomicU64,
}

impl Default for UserHandler {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRACKED_USERS)
    }
}

impl UserHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_tracked: usize) -> Self {
        Self {
            updates: DashMap::new(),
            max_tracked,
            untracked: AtomicU64::new(0),
        }
    }

    /// 某个用户收到的更新次数，未被单独计数的用户返回 0
    pub fn updates_for(&self, user_email: &str) -> u64 {
        self.updates.get(user_email).map(|v| *v).unwrap_or(0)
    }

    pub fn tracked_users(&self) -> usize {
        self.updates.len()
    }

    pub fn total_updates(&self) -> u64 {
        self.updates.iter().map(|e| *e.value()).sum::<u64>()
            + self.untracked.load(Ordering::Relaxed)
    }

    fn record_update(&self, user_email: &str) {
        if let Some(mut count) = self.updates.get_mut(user_email) {
            *count += 1;
            return;
        }
        if self.updates.len() >= self.max_tracked {
            self.untracked.fetch_add(1, Ordering::Relaxed);
            debug!(user_email, max_tracked = self.max_tracked, "用户计数已达上限，只计入总数");
            return;
        }
        *self.updates.entry(user_email.to_string()).or_insert(0) += 1;
    }
}

#[async_trait]
impl EventHandler for UserHandler {
    fn name(&self) -> &'static str {
        "user"
    }

    async fn handle(&self, ctx: &EventContext, event: &MeshEvent) -> Result<(), HandlerError> {
        let order = event.order();
        info!(
            topic = %ctx.topic,
            partition = ctx.partition,
            offset = ctx.offset,
            user_email = %order.user_email,
            order_id = %order.order_id,
            product_id = %order.product_id,
            quantity = order.quantity,
            price = order.price,
            "Processing user update"
        );

        self.record_update(&order.user_email);
        Ok(())
    }
}
