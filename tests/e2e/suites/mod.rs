//! 测试套件模块

pub mod delivery;
pub mod group_coordination;
pub mod ordering;
pub mod partition_independence;
pub mod publish_flow;
pub mod services;
