//! 删除并重建 topic

use std::time::Duration;

use mesh_shared::broker::TopicAdmin;
use mesh_shared::error::{MeshError, Result};
use mesh_shared::topics::{TopicSpec, is_internal_topic};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOptions {
    pub keep_existing: bool,
    pub settle: Duration,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            keep_existing: false,
            settle: Duration::from_secs(5),
        }
    }
}

/// 一次重建的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub existing: Vec<String>,
    pub deleted: Vec<String>,
    pub created: Vec<String>,
    /// `keep_existing` 时已存在而跳过创建的 topic
    pub kept: Vec<String>,
}

/// 重建 topic 布局
///
/// 内部 topic（`__` 前缀）永远不会被删除。
pub async fn reset_topics(
    admin: &dyn TopicAdmin,
    specs: &[TopicSpec],
    options: &ResetOptions,
) -> Result<ResetReport> {
    let mut report = ResetReport {
        existing: admin.list_topics().await?,
        ..ResetReport::default()
    };
    info!(topics = ?report.existing, "Existing topics");

    if !options.keep_existing {
        let to_delete: Vec<String> = report
            .existing
            .iter()
            .filter(|t| !is_internal_topic(t))
            .cloned()
            .collect();

        if to_delete.is_empty() {
            info!("No user-created topics to delete");
        } else {
            admin.delete_topics(&to_delete).await?;
            info!(topics = ?to_delete, "Deleted topics");
            report.deleted = to_delete;
        }

        tokio::time::sleep(options.settle).await;
    }

    for spec in specs {
        match admin.create_topic(spec).await {
            Ok(()) => {
                info!(
                    topic = %spec.name,
                    partitions = spec.partitions,
                    replication_factor = spec.replication_factor,
                    "Created topic"
                );
                report.created.push(spec.name.clone());
            }
            Err(MeshError::TopicAlreadyExists { topic }) if options.keep_existing => {
                warn!(topic = %topic, "Topic already exists, keeping it");
                report.kept.push(topic);
            }
            Err(e) => return Err(e),
        }
    }

    tokio::time::sleep(options.settle).await;
    Ok(report)
}
