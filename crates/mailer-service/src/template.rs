//! 订单通知摘要
//!
//! 固定字段顺序，价格统一保留两位小数并加 `$` 前缀。

use std::fmt;

use mesh_shared::events::OrderCreatedEvent;

/// 通知摘要中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub label: &'static str,
    pub value: String,
}

/// 订单通知摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub rows: Vec<SummaryRow>,
}

impl OrderSummary {
    pub fn from_order(order: &OrderCreatedEvent) -> Self {
        let row = |label, value: String| SummaryRow { label, value };
        Self {
            rows: vec![
                row("OrderID", order.order_id.clone()),
                row("Email", order.user_email.clone()),
                row("ProductID", order.product_id.clone()),
                row("Quantity", order.quantity.to_string()),
                row("Price", format_price(order.price)),
                row("Address", order.shipping_address.clone()),
                row("Payment", order.payment_method.clone()),
                row("Time", order.timestamp.to_rfc3339()),
            ],
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.value.as_str())
    }
}

impl fmt::Display for OrderSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.rows.iter().map(|r| r.label.len()).max().unwrap_or(0);
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<width$} | {}", row.label, row.value)?;
        }
        Ok(())
    }
}

pub fn format_price(price: f64) -> String {
    format!("${price:.2}")
}
