//! 测试辅助工具模块

mod api_client;
mod assertions;
mod handlers;

pub use api_client::*;
pub use assertions::*;
pub use handlers::*;
