use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::store::RegistryStore;
use super::types::{Instance, LeaseConfig};

// 清理任务的运行状态
#[derive(Debug)]
enum SweeperState {
    Inactive,
    Active {
        ttl: Duration,
        cancel: CancellationToken,
        tracker: TaskTracker,
    },
}

/// 过期实例清理器
///
/// 以 TTL 为周期扫描整个注册表，首次扫描发生在启动后一个 TTL。
/// 实例在最后一次 touch 之后的 `[TTL, 2×TTL)` 区间内被移除。
#[derive(Debug)]
pub struct ExpirationSweeper {
    state: SweeperState,
}

impl ExpirationSweeper {
    /// 按租约配置启动清理任务，TTL 未启用时不做任何事
    pub fn start(store: RegistryStore, lease: LeaseConfig) -> Self {
        let Some(ttl) = lease.ttl() else {
            tracing::info!("Lease expiration disabled, instances never expire");
            return Self {
                state: SweeperState::Inactive,
            };
        };

        let Some(first_sweep) = Instant::now().checked_add(ttl) else {
            tracing::error!(
                ttl_secs = ttl.as_secs(),
                "Lease ttl is too large to schedule, expiration disabled"
            );
            return Self {
                state: SweeperState::Inactive,
            };
        };

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let token = cancel.clone();

        tracker.spawn(async move {
            let mut interval = tokio::time::interval_at(first_sweep, ttl);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        tracing::debug!("Executing instance expiration check...");
                        Self::sweep(&store, ttl, Utc::now()).await;
                    }
                }
            }
            tracing::debug!("Expiration sweeper stopped");
        });
        tracker.close();

        tracing::info!(ttl_secs = ttl.as_secs(), "Expiration sweeper started");
        Self {
            state: SweeperState::Active {
                ttl,
                cancel,
                tracker,
            },
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SweeperState::Active { .. })
    }

    pub fn ttl(&self) -> Option<Duration> {
        match &self.state {
            SweeperState::Active { ttl, .. } => Some(*ttl),
            SweeperState::Inactive => None,
        }
    }

    /// 请求停止清理任务，可以在任意线程调用
    pub fn stop(&self) {
        if let SweeperState::Active { cancel, .. } = &self.state {
            cancel.cancel();
        }
    }

    /// 停止清理任务并等待其退出
    pub async fn shutdown(self) {
        if let SweeperState::Active {
            cancel, tracker, ..
        } = &self.state
        {
            cancel.cancel();
            tracker.wait().await;
        }
    }

    /// 执行一次扫描：移除 `now - ttl` 之前（含）最后一次 touch 的实例
    pub async fn sweep(store: &RegistryStore, ttl: Duration, now: DateTime<Utc>) -> Vec<Instance> {
        let cutoff = chrono::TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl_delta| now.checked_sub_signed(ttl_delta));
        let Some(cutoff) = cutoff else {
            tracing::error!(
                ttl_secs = ttl.as_secs(),
                "Lease ttl out of range, skipping expiration check"
            );
            return Vec::new();
        };
        let evicted = store.evict_untouched_since(cutoff).await;

        for instance in &evicted {
            tracing::warn!(
                group = %instance.group,
                instance_id = %instance.id,
                elapsed_secs = instance.age(now).as_secs(),
                timeout_secs = ttl.as_secs(),
                "Instance expired due to heartbeat timeout, removed from registry"
            );
        }
        if !evicted.is_empty() {
            tracing::info!(expired_count = evicted.len(), "Cleanup check completed");
        }

        evicted
    }
}

impl Drop for ExpirationSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
