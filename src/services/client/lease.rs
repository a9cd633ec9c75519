use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::api::RegistryApi;
use super::error::DiscoveryError;
use crate::services::registry::{Instance, Metadata};

/// 心跳统计信息
#[derive(Debug, Default)]
pub struct HeartbeatStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl HeartbeatStats {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// 租约的对外可见状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    Unregistered,
    Registering,
    Registered { heartbeating: bool },
    Deregistered,
}

// 后台心跳任务句柄，drop 时停止心跳
#[derive(Debug)]
struct Heartbeat {
    period: Duration,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
enum LeaseState {
    Unregistered,
    // 注册请求进行中，不持有锁
    Registering,
    Registered {
        id: String,
        heartbeat: Option<Heartbeat>,
    },
    Deregistered,
}

/// 客户端租约管理器
///
/// 负责一次性注册，并按服务端给出的心跳间隔定时刷新租约。
/// 生命周期：`Unregistered -> Registered -> Deregistered`，注销后任何生命周期操作都会失败。
#[derive(Debug)]
pub struct LeaseManager {
    api: RegistryApi,
    group: String,
    state: Mutex<LeaseState>,
    stats: Arc<HeartbeatStats>,
}

impl LeaseManager {
    pub fn new(api: RegistryApi, group: impl Into<String>) -> Self {
        Self {
            api,
            group: group.into(),
            state: Mutex::new(LeaseState::Unregistered),
            stats: Arc::new(HeartbeatStats::default()),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn stats(&self) -> &HeartbeatStats {
        &self.stats
    }

    pub async fn status(&self) -> LeaseStatus {
        match &*self.state.lock().await {
            LeaseState::Unregistered => LeaseStatus::Unregistered,
            LeaseState::Registering => LeaseStatus::Registering,
            LeaseState::Registered { heartbeat, .. } => LeaseStatus::Registered {
                heartbeating: heartbeat.is_some(),
            },
            LeaseState::Deregistered => LeaseStatus::Deregistered,
        }
    }

    /// 当前租约ID，未注册或已注销时为 `None`
    pub async fn id(&self) -> Option<String> {
        match &*self.state.lock().await {
            LeaseState::Registered { id, .. } => Some(id.clone()),
            _ => None,
        }
    }

    pub async fn heartbeat_interval(&self) -> Option<Duration> {
        match &*self.state.lock().await {
            LeaseState::Registered {
                heartbeat: Some(heartbeat),
                ..
            } => Some(heartbeat.period),
            _ => None,
        }
    }

    /// 注册到注册中心，成功后返回分配的实例ID
    ///
    /// 服务端给出的心跳间隔大于 0 时启动后台心跳，首次心跳立即发出。
    pub async fn register(&self, meta: Option<&Metadata>) -> Result<String, DiscoveryError> {
        {
            let mut state = self.state.lock().await;
            if !matches!(*state, LeaseState::Unregistered) {
                return Err(DiscoveryError::IllegalState(format!(
                    "lease in group {} is already registering, registered or deregistered",
                    self.group
                )));
            }
            *state = LeaseState::Registering;
        }

        // 注册请求期间释放锁，状态查询不会被阻塞
        let grant = match self.api.create(&self.group, meta).await {
            Ok(grant) => grant,
            Err(e) => {
                *self.state.lock().await = LeaseState::Unregistered;
                return Err(e);
            }
        };

        let heartbeat = (grant.heartbeat_hint > 0).then(|| {
            self.spawn_heartbeat(grant.id.clone(), Duration::from_secs(grant.heartbeat_hint))
        });

        tracing::info!(
            group = %self.group,
            instance_id = %grant.id,
            heartbeat_secs = grant.heartbeat_hint,
            "Registered to discovery service"
        );

        *self.state.lock().await = LeaseState::Registered {
            id: grant.id.clone(),
            heartbeat,
        };
        Ok(grant.id)
    }

    /// 手动刷新租约，不修改元数据
    pub async fn refresh(&self) -> Result<Instance, DiscoveryError> {
        let id = self.registered_id().await?;
        self.api.touch(&self.group, &id, None).await
    }

    /// 整体替换元数据，不影响心跳节奏
    pub async fn update_metadata(&self, meta: &Metadata) -> Result<Instance, DiscoveryError> {
        let id = self.registered_id().await?;
        self.api.touch(&self.group, &id, Some(meta)).await
    }

    /// 注销租约并停止心跳
    ///
    /// 服务端已不存在该实例时仍然停止心跳，但向调用方返回 `NotFound`。
    pub async fn deregister(&self) -> Result<(), DiscoveryError> {
        let mut state = self.state.lock().await;
        let id = match &*state {
            LeaseState::Registered { id, .. } => id.clone(),
            LeaseState::Unregistered | LeaseState::Registering => {
                return Err(DiscoveryError::IllegalState(
                    "lease is not registered".to_string(),
                ));
            }
            LeaseState::Deregistered => {
                return Err(DiscoveryError::IllegalState(
                    "lease is already deregistered".to_string(),
                ));
            }
        };

        let result = self.api.delete(&self.group, &id).await;
        if result.as_ref().is_err_and(|e| !e.is_not_found()) {
            return result;
        }

        if let LeaseState::Registered {
            heartbeat: Some(heartbeat),
            ..
        } = std::mem::replace(&mut *state, LeaseState::Deregistered)
        {
            heartbeat.cancel.cancel();
            heartbeat.tracker.wait().await;
        }

        tracing::info!(
            group = %self.group,
            instance_id = %id,
            "Deregistered from discovery service"
        );
        result
    }

    async fn registered_id(&self) -> Result<String, DiscoveryError> {
        match &*self.state.lock().await {
            LeaseState::Registered { id, .. } => Ok(id.clone()),
            LeaseState::Unregistered | LeaseState::Registering => Err(
                DiscoveryError::IllegalState("lease is not registered".to_string()),
            ),
            LeaseState::Deregistered => Err(DiscoveryError::IllegalState(
                "lease is already deregistered".to_string(),
            )),
        }
    }

    fn spawn_heartbeat(&self, id: String, period: Duration) -> Heartbeat {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let api = self.api.clone();
        let group = self.group.clone();
        let stats = self.stats.clone();
        let token = cancel.clone();

        tracker.spawn(async move {
            // 固定频率，第一次 tick 立即触发
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = api.touch(&group, &id, None) => match result {
                        Ok(instance) => {
                            stats.succeeded.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                group = %group,
                                instance_id = %id,
                                modified = %instance.modified,
                                "Heartbeat sent"
                            );
                        }
                        Err(e) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                group = %group,
                                instance_id = %id,
                                error = %e,
                                "Heartbeat failed, will retry on next period"
                            );
                        }
                    },
                }
            }
            tracing::debug!(group = %group, instance_id = %id, "Heartbeat stopped");
        });
        tracker.close();

        Heartbeat {
            period,
            cancel,
            tracker,
        }
    }
}
