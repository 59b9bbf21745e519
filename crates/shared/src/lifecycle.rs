//! 进程生命周期
//!
//! `Supervisor` 持有根取消令牌与宽限期，登记所有需要优雅停止的组件。
//! 收到 Ctrl+C / SIGTERM（或令牌被外部取消）后统一取消，
//! 再按登记的逆序逐个停止组件，所有组件共享同一个宽限期截止时间。

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::Broker;
use crate::consumer::GroupMember;
use crate::error::{MeshError, Result};

/// 可被监督停止的组件
#[async_trait]
pub trait Managed: Send + Sync {
    fn name(&self) -> String;

    /// 在 `grace` 内停止；超时也必须释放持有的外部资源
    async fn stop(&self, grace: Duration) -> Result<()>;
}

#[async_trait]
impl<B: Broker + 'static> Managed for GroupMember<B> {
    fn name(&self) -> String {
        format!("{}/{}", self.group_id(), self.member_id())
    }

    async fn stop(&self, grace: Duration) -> Result<()> {
        GroupMember::stop(self, grace).await
    }
}

/// 绑定到根令牌的后台任务
///
/// 任务自身负责观察令牌并退出；停止时最多等待宽限期，超时则中止。
pub struct ManagedTask {
    name: String,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ManagedTask {
    pub fn new(name: impl Into<String>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle: Mutex::new(Some(handle)),
        }
    }
}

#[async_trait]
impl Managed for ManagedTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn stop(&self, grace: Duration) -> Result<()> {
        let Some(mut handle) = self.handle.lock().take() else {
            return Ok(());
        };

        match time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MeshError::Internal(format!("任务 {} 异常退出: {e}", self.name))),
            Err(_) => {
                handle.abort();
                Err(MeshError::Internal(format!(
                    "任务 {} 未在宽限期内退出，已中止",
                    self.name
                )))
            }
        }
    }
}

/// 生命周期监督者
pub struct Supervisor {
    token: CancellationToken,
    grace: Duration,
    components: Vec<Box<dyn Managed>>,
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace,
            components: Vec::new(),
        }
    }

    /// 根取消令牌，组件应从它派生子令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn manage(&mut self, component: impl Managed + 'static) {
        info!(component = %component.name(), "组件已登记");
        self.components.push(Box::new(component));
    }

    /// 启动一个绑定到根令牌的后台任务并登记
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.token.child_token()));
        self.manage(ManagedTask::new(name, handle));
    }

    /// 等待 `signal` 或令牌被取消，然后停止全部组件
    pub async fn run_until_shutdown(self, signal: impl Future<Output = ()>) -> Result<()> {
        tokio::select! {
            _ = signal => {}
            _ = self.token.cancelled() => {
                info!("根令牌已被取消");
            }
        }
        self.shutdown().await
    }

    /// 取消根令牌并按登记逆序停止组件
    ///
    /// 每个组件都会被停止，返回遇到的第一个错误。
    pub async fn shutdown(self) -> Result<()> {
        info!(
            components = self.components.len(),
            grace_secs = self.grace.as_secs_f64(),
            "开始优雅关闭"
        );
        self.token.cancel();

        let deadline = Instant::now() + self.grace;
        let mut first_error = None;

        for component in self.components.iter().rev() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match component.stop(remaining).await {
                Ok(()) => info!(component = %component.name(), "组件已停止"),
                Err(e) => {
                    error!(component = %component.name(), error = %e, "组件停止失败");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => {
                info!("优雅关闭完成");
                Ok(())
            }
            Some(e) => {
                warn!("关闭过程中出现错误");
                Err(e)
            }
        }
    }
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭。
/// 信号处理器安装失败时记录错误并永不返回，由其他关闭路径接管。
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "安装 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "安装 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
