//! 共享库
//!
//! 包含所有服务共用的配置、错误处理、事件模型、broker 抽象与实现、
//! 生产者、消费组运行时、生命周期管理与可观测性等基础设施代码。

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod handler;
pub mod kafka;
pub mod lifecycle;
pub mod observability;
pub mod producer;
pub mod test_utils;
pub mod topics;
