//! 订单发布逻辑

use mesh_shared::error::Result;
use mesh_shared::events::{MeshEvent, OrderCreatedEvent, OrderDetails};
use mesh_shared::producer::Producer;
use tracing::info;

use crate::dto::OrderRequest;

/// 订单服务
///
/// 每次下单生成新的订单 ID；`user.updated` 携带与订单完全相同的内容。
#[derive(Clone)]
pub struct OrderService {
    producer: Producer,
}

impl OrderService {
    pub fn new(producer: Producer) -> Self {
        Self { producer }
    }

    /// 发布 `order.created`，返回完整事件
    pub async fn create_order(&self, details: OrderDetails) -> Result<OrderCreatedEvent> {
        let event = OrderCreatedEvent::new(details);
        let key = event.partition_key();
        info!(order_id = %event.order_id, key = %key, "发布 order.created");

        self.producer
            .publish_event(&MeshEvent::OrderCreated(event.clone()))
            .await?;
        Ok(event)
    }

    /// 以用户邮箱为 key 发布 `user.updated`
    pub async fn update_user(&self, order: &OrderCreatedEvent) -> Result<()> {
        info!(order_id = %order.order_id, key = %order.user_email, "发布 user.updated");
        self.producer
            .publish_event(&MeshEvent::UserUpdated(order.clone().into()))
            .await?;
        info!(order_id = %order.order_id, "用户更新已发布");
        Ok(())
    }

    /// 处理一次下单：先发布订单，按需再发布用户更新
    ///
    /// 用户更新发布失败时订单事件已经落盘，不做回滚。
    pub async fn place_order(&self, request: &OrderRequest) -> Result<OrderCreatedEvent> {
        let order = self.create_order(request.details()).await?;
        if request.wants_user_update() {
            self.update_user(&order).await?;
        }
        Ok(order)
    }
}
