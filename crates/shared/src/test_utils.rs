//! 测试工具模块
//!
//! 提供各 crate 单元测试与端到端测试共用的辅助函数、
//! 记录型处理器和测试数据生成器。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fake::Fake;
use fake::faker::address::en::StreetName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::Word;
use parking_lot::Mutex;
use tokio::time::{self, Instant};

use crate::broker::{MemoryBroker, TopicAdmin};
use crate::consumer::ConsumerSettings;
use crate::events::{MeshEvent, OrderCreatedEvent, OrderDetails};
use crate::handler::{EventContext, EventHandler, HandlerError};
use crate::topics::default_topic_specs;

// ==================== 测试数据 ====================

/// 指定邮箱与数量的固定订单
pub fn sample_details(user_email: &str, quantity: i64) -> OrderDetails {
    OrderDetails {
        user_email: user_email.to_string(),
        product_id: "p1".to_string(),
        quantity,
        price: 9.99,
        shipping_address: "1 Main St".to_string(),
        payment_method: "credit_card".to_string(),
    }
}

pub fn sample_order(user_email: &str, quantity: i64) -> OrderCreatedEvent {
    OrderCreatedEvent::new(sample_details(user_email, quantity))
}

/// 随机生成的订单明细
pub fn fake_details() -> OrderDetails {
    let cents: i64 = (100i64..100_000).fake();
    OrderDetails {
        user_email: SafeEmail().fake(),
        product_id: format!("prod-{}", Word().fake::<String>()),
        quantity: (1i64..10).fake(),
        price: cents as f64 / 100.0,
        shipping_address: format!("{} {}", (1u32..999).fake::<u32>(), StreetName().fake::<String>()),
        payment_method: ["credit_card", "paypal", "bank_transfer"][(0usize..3).fake::<usize>()]
            .to_string(),
    }
}

// ==================== 环境辅助 ====================

/// 创建默认 topic 集合已就绪的内存 broker
pub async fn memory_broker() -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::new());
    for spec in default_topic_specs() {
        // 新建的 broker 不会出现重名
        let _ = broker.create_topic(&spec).await;
    }
    broker
}

/// 短轮询间隔的消费者参数，缩短测试等待时间
pub fn fast_settings(client_id: &str, group_id: &str, topics: &[&str]) -> ConsumerSettings {
    ConsumerSettings {
        fetch_max_wait: Duration::from_millis(50),
        rebalance_interval: Duration::from_millis(10),
        ..ConsumerSettings::new(client_id, group_id, topics)
    }
}

/// 轮询等待条件成立，超时返回 false
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
}

// ==================== 记录型处理器 ====================

/// 一次投递的记录
#[derive(Debug, Clone)]
pub struct Delivery {
    pub ctx: EventContext,
    pub event: MeshEvent,
}

/// 记录所有投递的处理器
///
/// 可选地在处理时挂起一段时间，用于模拟慢处理器；
/// `failing` 构造的实例对每条记录都返回失败。
/// 同一实例可以交给多个成员共享，用来统计同一分区上的并发调用。
#[derive(Default)]
pub struct RecordingHandler {
    deliveries: Mutex<Vec<Delivery>>,
    delay: Option<Duration>,
    fail: bool,
    in_flight: Mutex<HashMap<(String, i32), usize>>,
    overlapping: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 等待至少 `count` 条投递
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.len() >= count).await
    }

    /// 进入时同一分区已有调用在执行的次数
    pub fn overlapping_calls(&self) -> usize {
        self.overlapping.load(Ordering::SeqCst)
    }

    fn enter(&self, ctx: &EventContext) {
        let mut in_flight = self.in_flight.lock();
        let running = in_flight.entry((ctx.topic.clone(), ctx.partition)).or_insert(0);
        if *running > 0 {
            self.overlapping.fetch_add(1, Ordering::SeqCst);
        }
        *running += 1;
    }

    fn exit(&self, ctx: &EventContext) {
        if let Some(running) = self.in_flight.lock().get_mut(&(ctx.topic.clone(), ctx.partition)) {
            *running = running.saturating_sub(1);
        }
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn handle(&self, ctx: &EventContext, event: &MeshEvent) -> Result<(), HandlerError> {
        self.enter(ctx);
        if let Some(delay) = self.delay {
            time::sleep(delay).await;
        }
        self.deliveries.lock().push(Delivery {
            ctx: ctx.clone(),
            event: event.clone(),
        });
        self.exit(ctx);
        if self.fail {
            return Err(HandlerError::Failed("模拟处理失败".to_string()));
        }
        Ok(())
    }
}
