//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 适配为 broker 能力面：
//! - `KafkaProducer` 实现 `RecordAppender`
//! - `KafkaAdmin` 实现 `TopicAdmin`
//! - `KafkaGroupConsumer` 把组协议交给 Kafka，按分区拆分队列并发消费，手动提交位点

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::{ClientContext, DefaultClientContext};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::stream_consumer::StreamPartitionQueue;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::metadata::Metadata;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{Ack, Record, RecordAppender, TopicAdmin};
use crate::config::KafkaConfig;
use crate::error::{MeshError, Result};
use crate::handler::{EventHandler, dispatch};
use crate::topics::TopicSpec;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const ADMIN_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// 消息转换
// ---------------------------------------------------------------------------

/// 从 rdkafka 的借用消息构造拥有所有权的 `Record`
///
/// 缺失负载视为空字节，由解码阶段判定为格式错误。
pub fn record_from_borrowed(msg: &BorrowedMessage<'_>) -> Record {
    let timestamp = msg
        .timestamp()
        .to_millis()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Record {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(<[u8]>::to_vec),
        value: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp,
    }
}

fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id);
    client
}

/// 元数据中存在且无错误、至少有一个分区的 topic 才视为存在
fn topic_exists(metadata: &Metadata, topic: &str) -> bool {
    metadata
        .topics()
        .iter()
        .any(|t| t.name() == topic && t.error().is_none() && !t.partitions().is_empty())
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 基于 `FutureProducer` 的记录追加器
///
/// 使用 `murmur2_random` 分区器，与内存 broker 的 key 分区结果一致。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = base_client_config(config)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .set("partitioner", "murmur2_random")
            .create()
            .map_err(|e| MeshError::Connection(format!("创建生产者失败: {e}")))?;

        Ok(Self {
            producer,
            send_timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }

    /// 创建生产者并拉取一次集群元数据，确认 broker 可达
    pub async fn connect(config: &KafkaConfig) -> Result<Self> {
        let this = Self::new(config)?;
        let producer = this.producer.clone();

        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|_| ())
        })
        .await
        .map_err(|e| MeshError::Internal(format!("元数据任务异常: {e}")))?
        .map_err(|e| MeshError::Connection(format!("连接 Kafka 失败: {e}")))?;

        info!(brokers = %config.brokers, client_id = %config.client_id, "Kafka 生产者已连接");
        Ok(this)
    }

    /// 刷出所有待发送消息
    pub fn flush(&self, timeout: Duration) {
        if let Err(e) = self.producer.flush(timeout) {
            warn!(error = %e, "刷出待发送消息超时");
        }
    }
}

#[async_trait]
impl RecordAppender for KafkaProducer {
    async fn append(&self, topic: &str, key: Option<&[u8]>, value: &[u8]) -> Result<Ack> {
        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(topic).payload(value);
        if let Some(key) = key {
            record = record.key(key);
        }

        // rdkafka 0.39+ 返回 Delivery 结构体而非元组
        let delivery = self
            .producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| match e {
                KafkaError::MessageProduction(RDKafkaErrorCode::AllBrokersDown) => {
                    MeshError::Connection(format!("所有 broker 不可用: {e}"))
                }
                other => MeshError::Kafka(format!("发送消息失败: {other}")),
            })?;

        debug!(
            topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok(Ack {
            partition: delivery.partition,
            offset: delivery.offset,
        })
    }
}

// ---------------------------------------------------------------------------
// KafkaAdmin
// ---------------------------------------------------------------------------

/// 基于 `AdminClient` 的 topic 管理
#[derive(Clone)]
pub struct KafkaAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
}

impl KafkaAdmin {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let admin: AdminClient<DefaultClientContext> = base_client_config(config)
            .create()
            .map_err(|e| MeshError::Connection(format!("创建管理客户端失败: {e}")))?;

        debug!(brokers = %config.brokers, "Kafka 管理客户端已创建");
        Ok(Self {
            admin: Arc::new(admin),
        })
    }

    /// 创建管理客户端并拉取一次集群元数据，确认 broker 可达
    pub async fn connect(config: &KafkaConfig) -> Result<Self> {
        let this = Self::new(config)?;
        let topics = this.topic_names().await?;
        info!(brokers = %config.brokers, topics = topics.len(), "Kafka 管理客户端已连接");
        Ok(this)
    }

    fn options() -> AdminOptions {
        AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT))
    }

    async fn topic_names(&self) -> Result<Vec<String>> {
        let admin = Arc::clone(&self.admin);
        tokio::task::spawn_blocking(move || {
            admin
                .inner()
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|metadata| {
                    metadata
                        .topics()
                        .iter()
                        .map(|t| t.name().to_string())
                        .collect::<Vec<String>>()
                })
        })
        .await
        .map_err(|e| MeshError::Internal(format!("元数据任务异常: {e}")))?
        .map_err(|e| MeshError::Connection(format!("获取集群元数据失败: {e}")))
    }
}

#[async_trait]
impl TopicAdmin for KafkaAdmin {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        let new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );

        let results = self
            .admin
            .create_topics(&[new_topic], &Self::options())
            .await
            .map_err(|e| MeshError::Kafka(format!("创建 topic 失败: {e}")))?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, partitions = spec.partitions, "topic 已创建"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(MeshError::TopicAlreadyExists { topic: name });
                }
                Err((name, code)) => {
                    return Err(MeshError::Kafka(format!("创建 topic {name} 失败: {code}")));
                }
            }
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        self.topic_names().await
    }

    async fn delete_topics(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let results = self
            .admin
            .delete_topics(&refs, &Self::options())
            .await
            .map_err(|e| MeshError::Kafka(format!("删除 topic 失败: {e}")))?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "topic 已删除"),
                Err((name, RDKafkaErrorCode::UnknownTopicOrPartition)) => {
                    return Err(MeshError::UnknownTopic { topic: name });
                }
                Err((name, code)) => {
                    return Err(MeshError::Kafka(format!("删除 topic {name} 失败: {code}")));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KafkaGroupConsumer
// ---------------------------------------------------------------------------

type PartitionKey = (String, i32);
type PartitionQueue = StreamPartitionQueue<PartitionContext>;

/// 再均衡回调转发给消费循环的事件
enum PartitionEvent {
    Assigned(Vec<(PartitionKey, Option<PartitionQueue>)>),
    Revoked(Vec<PartitionKey>),
}

fn partition_keys(tpl: &TopicPartitionList) -> Vec<PartitionKey> {
    tpl.elements()
        .iter()
        .map(|elem| (elem.topic().to_string(), elem.partition()))
        .collect()
}

/// 消费者上下文：在再均衡回调里拆分分区队列
///
/// 拆分必须紧跟 assign 完成，否则新分区的记录会先落进主队列。
struct PartitionContext {
    consumer: OnceLock<Weak<StreamConsumer<PartitionContext>>>,
    events: mpsc::UnboundedSender<PartitionEvent>,
}

impl ClientContext for PartitionContext {}

impl ConsumerContext for PartitionContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(tpl) = rebalance {
            let _ = self.events.send(PartitionEvent::Revoked(partition_keys(tpl)));
        }
    }

    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => {
                let consumer = self.consumer.get().and_then(Weak::upgrade);
                let assigned = partition_keys(tpl)
                    .into_iter()
                    .map(|(topic, partition)| {
                        let queue = consumer
                            .as_ref()
                            .and_then(|c| c.split_partition_queue(&topic, partition));
                        ((topic, partition), queue)
                    })
                    .collect();
                let _ = self.events.send(PartitionEvent::Assigned(assigned));
            }
            Rebalance::Revoke(_) => {}
            Rebalance::Error(e) => error!(error = %e, "Kafka 再均衡出错"),
        }
    }
}

/// 单个分区的消费任务
struct PartitionTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PartitionTask {
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "分区消费任务异常退出");
        }
    }
}

/// 基于 `StreamConsumer` 的消费组成员
///
/// 入组与再均衡由 Kafka 组协议完成；每个被分配的分区拆出独立队列，
/// 由各自的任务顺序处理，慢处理器只拖慢自己所在的分区。
/// 关闭自动提交，每条记录在处理器返回之后才提交其下一位点。
pub struct KafkaGroupConsumer {
    consumer: Arc<StreamConsumer<PartitionContext>>,
    events: mpsc::UnboundedReceiver<PartitionEvent>,
    group_id: String,
}

impl KafkaGroupConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let context = PartitionContext {
            consumer: OnceLock::new(),
            events: tx,
        };

        let consumer: StreamConsumer<PartitionContext> = base_client_config(config)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create_with_context(context)
            .map_err(|e| MeshError::Connection(format!("创建消费者失败: {e}")))?;

        let consumer = Arc::new(consumer);
        let _ = consumer.context().consumer.set(Arc::downgrade(&consumer));

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self {
            consumer,
            events,
            group_id: config.consumer_group.clone(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// 确认 topic 存在后订阅
    pub async fn subscribe(&self, topics: &[&str]) -> Result<()> {
        let consumer = Arc::clone(&self.consumer);
        let metadata = tokio::task::spawn_blocking(move || {
            consumer.fetch_metadata(None, METADATA_TIMEOUT)
        })
        .await
        .map_err(|e| MeshError::Internal(format!("元数据任务异常: {e}")))?
        .map_err(|e| MeshError::Connection(format!("获取集群元数据失败: {e}")))?;

        if let Some(missing) = topics.iter().find(|t| !topic_exists(&metadata, t)) {
            return Err(MeshError::UnknownTopic {
                topic: missing.to_string(),
            });
        }

        self.consumer
            .subscribe(topics)
            .map_err(|e| MeshError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(group_id = %self.group_id, ?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环，直到 `shutdown` 被取消
    ///
    /// 主循环持续轮询主队列以驱动再均衡回调，并按分配结果增减分区任务。
    /// 取消只在两条记录之间生效，正在执行的处理器总能完成并提交。
    pub async fn run(self, shutdown: CancellationToken, handler: Arc<dyn EventHandler>) {
        let Self {
            consumer,
            mut events,
            group_id,
        } = self;
        let mut tasks: HashMap<PartitionKey, PartitionTask> = HashMap::new();

        info!(group_id = %group_id, handler = handler.name(), "Kafka 消费循环已启动");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("收到关闭信号，Kafka 消费循环退出");
                    break;
                }

                Some(event) = events.recv() => match event {
                    PartitionEvent::Revoked(keys) => {
                        let revoked: Vec<PartitionTask> =
                            keys.iter().filter_map(|key| tasks.remove(key)).collect();
                        join_all(revoked.into_iter().map(PartitionTask::stop)).await;
                        info!(partitions = ?keys, "分区已撤销");
                    }
                    PartitionEvent::Assigned(assigned) => {
                        for (key, queue) in assigned {
                            // assign 会使旧的分区队列失效，已有任务一律替换
                            if let Some(task) = tasks.remove(&key) {
                                task.stop().await;
                            }
                            let Some(queue) = queue else {
                                warn!(topic = %key.0, partition = key.1, "分区队列拆分失败，记录将经由主队列处理");
                                continue;
                            };
                            info!(topic = %key.0, partition = key.1, "分区已分配");
                            let token = shutdown.child_token();
                            let handle = tokio::spawn(consume_partition_queue(
                                Arc::clone(&consumer),
                                queue,
                                Arc::clone(&handler),
                                token.clone(),
                            ));
                            tasks.insert(key, PartitionTask { token, handle });
                        }
                    }
                },

                msg_result = consumer.recv() => {
                    let record = match msg_result {
                        Ok(borrowed) => record_from_borrowed(&borrowed),
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                            continue;
                        }
                    };
                    process_and_commit(&consumer, handler.as_ref(), &record).await;
                }
            }
        }

        join_all(tasks.drain().map(|(_, task)| task.stop())).await;
        consumer.unsubscribe();
        info!(group_id = %group_id, "Kafka 消费者已离组");
    }
}

/// 顺序消费单个分区队列，直到被撤销或关闭
async fn consume_partition_queue(
    consumer: Arc<StreamConsumer<PartitionContext>>,
    queue: PartitionQueue,
    handler: Arc<dyn EventHandler>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            msg_result = queue.recv() => {
                let record = match msg_result {
                    Ok(borrowed) => record_from_borrowed(&borrowed),
                    Err(e) => {
                        error!(error = %e, "接收分区消息出错");
                        continue;
                    }
                };
                process_and_commit(&consumer, handler.as_ref(), &record).await;
            }
        }
    }
}

async fn process_and_commit(
    consumer: &StreamConsumer<PartitionContext>,
    handler: &dyn EventHandler,
    record: &Record,
) {
    dispatch(handler, record).await;

    if let Err(e) = commit_next(consumer, record) {
        error!(
            error = %e,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "提交位点失败"
        );
    }
}

fn commit_next(consumer: &StreamConsumer<PartitionContext>, record: &Record) -> Result<()> {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
        .map_err(|e| MeshError::Kafka(e.to_string()))?;
    consumer
        .commit(&tpl, CommitMode::Async)
        .map_err(|e| MeshError::Kafka(e.to_string()))
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
