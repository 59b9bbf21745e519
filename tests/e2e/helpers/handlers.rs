//! 测试专用处理器

use std::time::Duration;

use async_trait::async_trait;
use mesh_shared::events::MeshEvent;
use mesh_shared::handler::{EventContext, EventHandler, HandlerError};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// 记录到达后永远挂起，模拟处理过程中崩溃的成员
#[derive(Default)]
pub struct StallingHandler {
    arrived: Mutex<Vec<i64>>,
}

impl StallingHandler {
    pub fn arrived(&self) -> Vec<i64> {
        self.arrived.lock().clone()
    }
}

#[async_trait]
impl EventHandler for StallingHandler {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn handle(&self, ctx: &EventContext, _event: &MeshEvent) -> Result<(), HandlerError> {
        self.arrived.lock().push(ctx.offset);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// 指定分区上的记录在放行前一直挂起，其余分区照常处理
pub struct GatedHandler {
    partition: i32,
    gate: CancellationToken,
    held: Mutex<Vec<i64>>,
    handled: Mutex<Vec<(i32, i64)>>,
}

impl GatedHandler {
    pub fn new(partition: i32) -> Self {
        Self {
            partition,
            gate: CancellationToken::new(),
            held: Mutex::new(Vec::new()),
            handled: Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self) {
        self.gate.cancel();
    }

    /// 在闸门处等待过的位点
    pub fn held(&self) -> Vec<i64> {
        self.held.lock().clone()
    }

    /// 已处理完成的 (分区, 位点)
    pub fn handled(&self) -> Vec<(i32, i64)> {
        self.handled.lock().clone()
    }
}

#[async_trait]
impl EventHandler for GatedHandler {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn handle(&self, ctx: &EventContext, _event: &MeshEvent) -> Result<(), HandlerError> {
        if ctx.partition == self.partition {
            self.held.lock().push(ctx.offset);
            self.gate.cancelled().await;
        }
        self.handled.lock().push((ctx.partition, ctx.offset));
        Ok(())
    }
}
