//! 单进程订单网格
//!
//! 内存 broker 之上同时运行下单入口、邮件消费组和用户消费组，
//! 无需 Kafka 集群即可演示完整的事件流。

use std::sync::Arc;

use axum::Router;
use mailer_service::MailerHandler;
use mesh_shared::{
    broker::{MemoryBroker, TopicAdmin},
    config::AppConfig,
    consumer::{ConsumerSettings, GroupMember},
    error::Result,
    lifecycle::Supervisor,
    producer::Producer,
};
use order_service::{AppState, OrderService, routes};
use tracing::info;
use user_service::UserHandler;

pub const SERVICE_NAME: &str = "order-mesh";

/// 组装好的网格
pub struct Mesh {
    pub broker: Arc<MemoryBroker>,
    pub orders: OrderService,
    pub mailer: Arc<MailerHandler>,
    pub users: Arc<UserHandler>,
    members: Vec<GroupMember<MemoryBroker>>,
}

impl Mesh {
    /// 创建配置中的 topic 并构建两个消费组成员（尚未启动）
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let broker = Arc::new(MemoryBroker::new());
        for spec in &config.topics {
            broker.create_topic(spec).await?;
        }

        let mailer = Arc::new(MailerHandler::new());
        let users = Arc::new(UserHandler::new());

        let settings = |service: &str, topics: &[&str]| ConsumerSettings {
            client_id: service.to_string(),
            group_id: format!("{service}-group"),
            ..ConsumerSettings::from_config(&config.kafka, &config.consumer, topics)
        };

        let members = vec![
            GroupMember::new(
                broker.clone(),
                settings(mailer_service::SERVICE_NAME, mailer_service::TOPICS),
                mailer.clone(),
            ),
            GroupMember::new(
                broker.clone(),
                settings(user_service::SERVICE_NAME, user_service::TOPICS),
                users.clone(),
            ),
        ];

        let orders = OrderService::new(Producer::new(broker.clone()));

        Ok(Self {
            broker,
            orders,
            mailer,
            users,
            members,
        })
    }

    pub fn members(&self) -> &[GroupMember<MemoryBroker>] {
        &self.members
    }

    pub fn router(&self) -> Router {
        routes::router(AppState::new(self.orders.clone()))
    }

    /// 启动所有成员并交给 supervisor 管理
    ///
    /// 任一成员启动失败时，已启动的成员仍由 supervisor 负责停止。
    pub async fn start(&self, supervisor: &mut Supervisor) -> Result<()> {
        for member in &self.members {
            member.start(&supervisor.token()).await?;
            info!(group = %member.group_id(), member = %member.member_id(), "消费组成员已启动");
            supervisor.manage(member.clone());
        }
        Ok(())
    }
}
