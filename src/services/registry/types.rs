use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 实例元数据：字符串键 -> 任意 JSON 值
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// 注册表中的一条服务实例记录
///
/// `meta` 为 `None` 表示注册时未携带元数据，与 `Some(空对象)` 是不同的状态，
/// 序列化时前者省略 `meta` 字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub group: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
}

impl Instance {
    pub(crate) fn new(id: String, group: String, meta: Option<Metadata>) -> Self {
        let now = Utc::now();
        Self {
            id,
            group,
            created: now,
            modified: now,
            meta,
        }
    }

    // 刷新修改时间，保证严格递增（时钟回拨或同一纳秒内的多次 touch）
    pub(crate) fn touch(&mut self, meta: Option<Metadata>) {
        let now = Utc::now();
        self.modified = if now > self.modified {
            now
        } else {
            self.modified + chrono::TimeDelta::nanoseconds(1)
        };
        if let Some(meta) = meta {
            self.meta = Some(meta);
        }
    }

    /// 距离上次 touch 经过的时间
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.modified).to_std().unwrap_or_default()
    }
}

/// 注册表级别的租约配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// 租约 TTL 秒数，`<= 0` 表示永不过期
    pub ttl_seconds: i64,
}

impl LeaseConfig {
    /// 允许配置的最大 TTL（30 天）
    pub const MAX_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

    pub fn new(ttl_seconds: i64) -> Self {
        Self { ttl_seconds }
    }

    /// 永不过期的租约配置
    pub fn disabled() -> Self {
        Self { ttl_seconds: 0 }
    }

    /// 启用过期清理时返回 TTL 时长
    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// 推荐给客户端的心跳间隔（秒），0 表示无需心跳
    pub fn heartbeat_hint(&self) -> u64 {
        match self.ttl_seconds {
            ..=1 => 0,
            ttl => (ttl - 1) as u64,
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { ttl_seconds: 30 }
    }
}
