//! 请求与响应 DTO

use mesh_shared::events::OrderDetails;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 下单请求
///
/// `userEmail` 可以为空，此时分区键退化为时间戳，且不会发布用户更新。
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub user_email: String,
    pub product_id: String,
    #[validate(range(min = 1, message = "数量必须大于等于 1"))]
    pub quantity: i64,
    #[validate(range(min = 0.0, message = "价格不能为负数"))]
    pub price: f64,
    pub shipping_address: String,
    pub payment_method: String,
    #[serde(default)]
    pub send_user_update: bool,
}

impl OrderRequest {
    /// 是否需要额外发布 `user.updated`
    pub fn wants_user_update(&self) -> bool {
        self.send_user_update && !self.user_email.is_empty()
    }

    pub fn details(&self) -> OrderDetails {
        OrderDetails {
            user_email: self.user_email.clone(),
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            price: self.price,
            shipping_address: self.shipping_address.clone(),
            payment_method: self.payment_method.clone(),
        }
    }
}

/// 错误响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
