//! 消费组成员运行时
//!
//! 成员状态机：`Disconnected → Connecting → Subscribed → Running → Stopping → Disconnected`。
//!
//! 运行期间由一个再均衡循环周期性读取目标分配：对新分到且能获得所有权的分区
//! 启动分区 worker，对被收回的分区取消 worker。每个分区 worker 按位点顺序逐条
//! 分发记录，处理器返回后才提交位点（至少一次）。不同分区的 worker 并发执行，
//! 同一分区永远只有一个 worker。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, TopicPartition};
use crate::config::{ConsumerConfig, KafkaConfig};
use crate::error::{MeshError, Result};
use crate::handler::{EventHandler, dispatch};

// ---------------------------------------------------------------------------
// 配置与状态
// ---------------------------------------------------------------------------

/// 成员运行参数
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub client_id: String,
    pub group_id: String,
    pub topics: Vec<String>,
    /// 新消费组从最早保留位点开始，否则从日志末尾开始
    pub from_beginning: bool,
    pub fetch_max_records: usize,
    pub fetch_max_wait: Duration,
    pub rebalance_interval: Duration,
}

impl ConsumerSettings {
    pub fn new(
        client_id: impl Into<String>,
        group_id: impl Into<String>,
        topics: &[&str],
    ) -> Self {
        let defaults = ConsumerConfig::default();
        Self {
            client_id: client_id.into(),
            group_id: group_id.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            from_beginning: true,
            fetch_max_records: defaults.fetch_max_records,
            fetch_max_wait: defaults.fetch_max_wait(),
            rebalance_interval: defaults.rebalance_interval(),
        }
    }

    /// 由服务配置构造，消费组名与客户端 ID 取自 kafka 段
    pub fn from_config(kafka: &KafkaConfig, consumer: &ConsumerConfig, topics: &[&str]) -> Self {
        Self {
            client_id: kafka.client_id.clone(),
            group_id: kafka.consumer_group.clone(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            from_beginning: kafka.from_beginning(),
            fetch_max_records: consumer.fetch_max_records,
            fetch_max_wait: consumer.fetch_max_wait(),
            rebalance_interval: consumer.rebalance_interval(),
        }
    }

    /// 拉取上限与再均衡周期必须为正
    pub fn validate(&self) -> Result<()> {
        if self.fetch_max_records == 0 {
            return Err(MeshError::InvalidArgument {
                field: "fetch_max_records".to_string(),
                message: "必须大于 0".to_string(),
            });
        }
        if self.rebalance_interval.is_zero() {
            return Err(MeshError::InvalidArgument {
                field: "rebalance_interval".to_string(),
                message: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}

/// 成员生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Disconnected,
    Connecting,
    Subscribed,
    Running,
    Stopping,
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Subscribed => "SUBSCRIBED",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// GroupMember
// ---------------------------------------------------------------------------

struct RunState {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared<B> {
    broker: Arc<B>,
    settings: ConsumerSettings,
    handler: Arc<dyn EventHandler>,
    member_id: String,
    state: watch::Sender<MemberState>,
    run: Mutex<Option<RunState>>,
}

impl<B> Shared<B> {
    fn set_state(&self, next: MemberState) {
        let prev = self.state.send_replace(next);
        debug!(
            group = %self.settings.group_id,
            member = %self.member_id,
            from = %prev,
            to = %next,
            "成员状态迁移"
        );
    }
}

/// 消费组成员
///
/// broker、组名、订阅集合与处理器全部通过构造参数注入，不依赖任何全局状态。
pub struct GroupMember<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for GroupMember<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Broker + 'static> GroupMember<B> {
    pub fn new(broker: Arc<B>, settings: ConsumerSettings, handler: Arc<dyn EventHandler>) -> Self {
        let member_id = format!("{}-{}", settings.client_id, Uuid::new_v4());
        let (state, _) = watch::channel(MemberState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                broker,
                settings,
                handler,
                member_id,
                state,
                run: Mutex::new(None),
            }),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.shared.member_id
    }

    pub fn group_id(&self) -> &str {
        &self.shared.settings.group_id
    }

    pub fn state(&self) -> MemberState {
        *self.shared.state.borrow()
    }

    /// 连接、订阅并进入运行状态
    ///
    /// 参数非法、任一订阅 topic 不存在或入组失败时返回错误并回到 `Disconnected`。
    /// `shutdown` 被取消时运行循环随之退出，但仍需调用 `stop` 离组。
    pub async fn start(&self, shutdown: &CancellationToken) -> Result<()> {
        let shared = &self.shared;
        let claimed = shared.state.send_if_modified(|state| {
            if *state == MemberState::Disconnected {
                *state = MemberState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(MeshError::InvalidState(format!(
                "成员 {} 当前状态为 {}，无法启动",
                shared.member_id,
                self.state()
            )));
        }

        if let Err(e) = self.connect_and_subscribe().await {
            error!(
                group = %shared.settings.group_id,
                member = %shared.member_id,
                error = %e,
                "消费者启动失败"
            );
            shared.set_state(MemberState::Disconnected);
            return Err(e);
        }

        let token = shutdown.child_token();
        let task = tokio::spawn(rebalance_loop(Arc::clone(shared), token.clone()));
        *shared.run.lock() = Some(RunState { token, task });
        shared.set_state(MemberState::Running);

        info!(
            group = %shared.settings.group_id,
            member = %shared.member_id,
            "消费者运行中，等待消息"
        );
        Ok(())
    }

    async fn connect_and_subscribe(&self) -> Result<()> {
        let shared = &self.shared;
        shared.settings.validate()?;

        for topic in &shared.settings.topics {
            shared.broker.partition_count(topic).await?;
        }
        info!(
            group = %shared.settings.group_id,
            member = %shared.member_id,
            "消费者已连接"
        );

        let generation = shared
            .broker
            .join_group(
                &shared.settings.group_id,
                &shared.member_id,
                &shared.settings.topics,
            )
            .await?;
        shared.set_state(MemberState::Subscribed);

        for topic in &shared.settings.topics {
            info!(
                topic = %topic,
                from_beginning = shared.settings.from_beginning,
                generation,
                "已订阅 topic"
            );
        }
        Ok(())
    }

    /// 停止消费并离组
    ///
    /// 等待在途记录处理完成，最多 `grace`；无论是否按时排空都会离组，
    /// 让剩余成员尽快再均衡。对已断开的成员调用是空操作。
    pub async fn stop(&self, grace: Duration) -> Result<()> {
        let shared = &self.shared;
        let claimed = shared.state.send_if_modified(|state| {
            if *state == MemberState::Running {
                *state = MemberState::Stopping;
                true
            } else {
                false
            }
        });
        if !claimed {
            return match self.state() {
                MemberState::Disconnected => Ok(()),
                other => Err(MeshError::InvalidState(format!(
                    "成员 {} 当前状态为 {}，无法停止",
                    shared.member_id, other
                ))),
            };
        }

        let run = shared.run.lock().take();
        if let Some(RunState { token, mut task }) = run {
            token.cancel();
            if time::timeout(grace, &mut task).await.is_err() {
                warn!(
                    group = %shared.settings.group_id,
                    member = %shared.member_id,
                    grace_ms = grace.as_millis() as u64,
                    "在途消息未在宽限期内处理完成，强制离组"
                );
                task.abort();
            }
        }

        let result = shared
            .broker
            .leave_group(&shared.settings.group_id, &shared.member_id)
            .await;
        shared.set_state(MemberState::Disconnected);

        match &result {
            Ok(()) => info!(
                group = %shared.settings.group_id,
                member = %shared.member_id,
                "消费者已断开"
            ),
            Err(e) => warn!(
                group = %shared.settings.group_id,
                member = %shared.member_id,
                error = %e,
                "离组失败"
            ),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// 再均衡循环与分区 worker
// ---------------------------------------------------------------------------

struct PartitionWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

// 再均衡循环被中止时，未完成的 worker 随之中止，在途记录不会被提交
impl Drop for PartitionWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn rebalance_loop<B: Broker + 'static>(shared: Arc<Shared<B>>, token: CancellationToken) {
    let settings = &shared.settings;
    let mut workers: HashMap<TopicPartition, PartitionWorker> = HashMap::new();
    let mut ticker = time::interval(settings.rebalance_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut generation = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        workers.retain(|_, w| !w.handle.is_finished());

        let assignment = match shared
            .broker
            .assignment(&settings.group_id, &shared.member_id)
            .await
        {
            Ok(a) => a,
            Err(e) => {
                warn!(
                    group = %settings.group_id,
                    member = %shared.member_id,
                    error = %e,
                    "读取分区分配失败"
                );
                continue;
            }
        };

        if assignment.generation != generation {
            generation = assignment.generation;
            info!(
                group = %settings.group_id,
                member = %shared.member_id,
                generation,
                partitions = ?assignment.partitions,
                "分区分配已更新"
            );
        }

        for (tp, worker) in &workers {
            if !assignment.partitions.contains(tp) && !worker.token.is_cancelled() {
                info!(member = %shared.member_id, partition = %tp, "分区被收回，处理完当前记录后停止");
                worker.token.cancel();
            }
        }

        for tp in assignment.partitions {
            if workers.contains_key(&tp) {
                continue;
            }
            match shared
                .broker
                .acquire_partition(&settings.group_id, &shared.member_id, &tp)
                .await
            {
                Ok(true) => {
                    let worker_token = token.child_token();
                    let handle = tokio::spawn(partition_worker(
                        Arc::clone(&shared),
                        tp.clone(),
                        worker_token.clone(),
                    ));
                    workers.insert(
                        tp,
                        PartitionWorker {
                            token: worker_token,
                            handle,
                        },
                    );
                }
                Ok(false) => {
                    debug!(member = %shared.member_id, partition = %tp, "分区仍被其他成员持有，等待释放");
                }
                Err(e) => {
                    warn!(member = %shared.member_id, partition = %tp, error = %e, "获取分区所有权失败");
                }
            }
        }
    }

    for worker in workers.values() {
        worker.token.cancel();
    }
    for (tp, mut worker) in workers {
        if let Err(e) = (&mut worker.handle).await {
            error!(partition = %tp, error = %e, "分区 worker 异常退出");
        }
    }
}

async fn partition_worker<B: Broker + 'static>(
    shared: Arc<Shared<B>>,
    tp: TopicPartition,
    token: CancellationToken,
) {
    let settings = &shared.settings;
    let member = shared.member_id.as_str();

    match start_offset(&shared, &tp).await {
        Ok(start) => {
            info!(member, partition = %tp, offset = start, "开始消费分区");
            consume_partition(&shared, &tp, start, &token).await;
        }
        Err(e) => {
            error!(member, partition = %tp, error = %e, "无法确定起始位点");
        }
    }

    if let Err(e) = shared
        .broker
        .release_partition(&settings.group_id, member, &tp)
        .await
    {
        warn!(member, partition = %tp, error = %e, "释放分区所有权失败");
    }
    debug!(member, partition = %tp, "分区 worker 已退出");
}

/// 已提交位点优先；新消费组按 from_beginning 决定从头还是从末尾开始
async fn start_offset<B: Broker>(shared: &Shared<B>, tp: &TopicPartition) -> Result<i64> {
    let committed = shared
        .broker
        .committed_offset(&shared.settings.group_id, tp)
        .await?;
    match committed {
        Some(offset) => Ok(offset),
        None if shared.settings.from_beginning => Ok(0),
        None => shared.broker.log_end_offset(tp).await,
    }
}

async fn consume_partition<B: Broker>(
    shared: &Shared<B>,
    tp: &TopicPartition,
    mut position: i64,
    token: &CancellationToken,
) {
    let settings = &shared.settings;
    let member = shared.member_id.as_str();

    loop {
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            r = shared.broker.fetch(tp, position, settings.fetch_max_records, settings.fetch_max_wait) => r,
        };

        let batch = match fetched {
            Ok(batch) => batch,
            Err(e @ (MeshError::UnknownTopic { .. } | MeshError::UnknownPartition { .. })) => {
                // topic 已删除：交还分区，重建后由再均衡重新分配
                info!(member, partition = %tp, error = %e, "分区已不存在，停止消费");
                return;
            }
            Err(e) => {
                warn!(member, partition = %tp, error = %e, "拉取记录失败");
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = time::sleep(settings.rebalance_interval) => continue,
                }
            }
        };

        for record in batch {
            // 只在记录之间检查取消，在途处理器总能完成
            if token.is_cancelled() {
                return;
            }

            let outcome = dispatch(shared.handler.as_ref(), &record).await;
            position = record.offset + 1;

            if let Err(e) = shared
                .broker
                .commit_offset(&settings.group_id, member, tp, position)
                .await
            {
                // 已失去所有权：该记录会由新的持有者重新投递
                warn!(member, partition = %tp, offset = record.offset, error = %e, "提交位点失败，停止消费该分区");
                return;
            }
            debug!(member, partition = %tp, offset = record.offset, ?outcome, "位点已提交");
        }
    }
}
