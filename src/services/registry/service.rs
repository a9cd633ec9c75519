use super::error::RegistryError;
use super::store::{RegistryStore, RegistrySnapshot};
use super::types::{Instance, LeaseConfig, Metadata};

/// 注册成功后返回给调用方的信息
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub instance: Instance,
    /// 推荐的心跳间隔（秒），0 表示无需心跳
    pub heartbeat_hint: u64,
}

impl Registration {
    /// 实例的资源路径 `/{group}/{id}`，路径段经过百分号编码
    pub fn location(&self) -> String {
        format!(
            "/{}/{}",
            urlencoding::encode(&self.instance.group),
            urlencoding::encode(&self.instance.id)
        )
    }
}

// 注册服务：把注册表操作一一映射到存储层
#[derive(Debug, Clone)]
pub struct RegistrationService {
    store: RegistryStore,
    lease: LeaseConfig,
}

impl RegistrationService {
    pub fn new(store: RegistryStore, lease: LeaseConfig) -> Self {
        Self { store, lease }
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn lease(&self) -> LeaseConfig {
        self.lease
    }

    pub async fn create(&self, group: &str, meta: Option<Metadata>) -> Registration {
        let instance = self.store.insert(group, meta).await;
        tracing::info!(
            group = %group,
            instance_id = %instance.id,
            "Registering instance"
        );

        Registration {
            instance,
            heartbeat_hint: self.lease.heartbeat_hint(),
        }
    }

    pub async fn read_group(&self, group: &str) -> Result<Vec<Instance>, RegistryError> {
        self.store.list(group).await
    }

    pub async fn read_instance(&self, group: &str, id: &str) -> Result<Instance, RegistryError> {
        self.store.get(group, id).await
    }

    pub async fn read_all(&self) -> RegistrySnapshot {
        self.store.snapshot().await
    }

    pub async fn update(
        &self,
        group: &str,
        id: &str,
        meta: Option<Metadata>,
    ) -> Result<Instance, RegistryError> {
        let replaces_meta = meta.is_some();
        let instance = self.store.touch(group, id, meta).await?;
        tracing::debug!(
            group = %group,
            instance_id = %id,
            replaces_meta,
            "Instance touched"
        );
        Ok(instance)
    }

    pub async fn delete(&self, group: &str, id: &str) -> Result<(), RegistryError> {
        self.store.remove(group, id).await?;
        tracing::info!(group = %group, instance_id = %id, "Unregistered instance");
        Ok(())
    }
}
