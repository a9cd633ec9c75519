use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::RegistryError;
use super::types::{Instance, Metadata};

// 单个分组内的实例集合（实例ID -> 实例），每个分组一把读写锁
pub type GroupInstances = Arc<RwLock<HashMap<String, Instance>>>;

/// 分组名 -> 实例列表的完整视图
pub type RegistrySnapshot = BTreeMap<String, Vec<Instance>>;

/// 并发安全的实例存储
///
/// 按分组做锁分段：同一分组内的写操作互斥，不同分组之间互不阻塞。
/// 另有一张全局的 ID 索引，保证实例 ID 在所有分组中唯一。
#[derive(Debug, Clone, Default)]
pub struct RegistryStore {
    // 分组名 -> 分组内实例
    groups: Arc<DashMap<String, GroupInstances>>,
    // 实例ID -> 所属分组
    ids: Arc<DashMap<String, String>>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在指定分组下创建新实例，分组不存在时自动创建
    pub async fn insert(&self, group: &str, meta: Option<Metadata>) -> Instance {
        let id = self.reserve_id(group);
        let instances = self.group_or_create(group);

        let instance = Instance::new(id.clone(), group.to_string(), meta);
        instances.write().await.insert(id, instance.clone());
        instance
    }

    /// 列出分组内的全部实例，按创建时间排序
    pub async fn list(&self, group: &str) -> Result<Vec<Instance>, RegistryError> {
        let instances = self
            .group(group)
            .ok_or_else(|| RegistryError::GroupNotFound {
                group: group.to_string(),
            })?;

        let guard = instances.read().await;
        Ok(sorted(guard.values()))
    }

    pub async fn get(&self, group: &str, id: &str) -> Result<Instance, RegistryError> {
        let instances = self
            .group(group)
            .ok_or_else(|| RegistryError::instance_not_found(group, id))?;

        let guard = instances.read().await;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::instance_not_found(group, id))
    }

    /// 刷新实例的修改时间；携带元数据时整体替换原有元数据
    pub async fn touch(
        &self,
        group: &str,
        id: &str,
        meta: Option<Metadata>,
    ) -> Result<Instance, RegistryError> {
        let instances = self
            .group(group)
            .ok_or_else(|| RegistryError::instance_not_found(group, id))?;

        let mut guard = instances.write().await;
        let instance = guard
            .get_mut(id)
            .ok_or_else(|| RegistryError::instance_not_found(group, id))?;
        instance.touch(meta);
        Ok(instance.clone())
    }

    pub async fn remove(&self, group: &str, id: &str) -> Result<Instance, RegistryError> {
        let instances = self
            .group(group)
            .ok_or_else(|| RegistryError::instance_not_found(group, id))?;

        let removed = instances
            .write()
            .await
            .remove(id)
            .ok_or_else(|| RegistryError::instance_not_found(group, id))?;
        self.ids.remove(id);
        Ok(removed)
    }

    /// 整个注册表在某一时刻的一致视图
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let groups = self.sorted_groups();

        // 按分组名顺序拿齐所有读锁后再复制，写操作每次只持有一把锁，不会死锁
        let mut guards = Vec::with_capacity(groups.len());
        for (name, instances) in &groups {
            guards.push((name, instances.read().await));
        }

        guards
            .into_iter()
            .map(|(name, guard)| (name.clone(), sorted(guard.values())))
            .collect()
    }

    /// 移除所有最后一次 touch 不晚于 `cutoff` 的实例，返回被移除的实例
    ///
    /// 判断与删除在分组写锁内完成，先于本次检查提交的 touch 一定会被看到。
    pub async fn evict_untouched_since(&self, cutoff: DateTime<Utc>) -> Vec<Instance> {
        let mut evicted = Vec::new();

        for (_, instances) in self.sorted_groups() {
            let mut guard = instances.write().await;
            guard.retain(|_, instance| {
                if instance.modified <= cutoff {
                    evicted.push(instance.clone());
                    false
                } else {
                    true
                }
            });
        }

        for instance in &evicted {
            self.ids.remove(&instance.id);
        }
        evicted
    }

    // 生成新的实例ID并在全局索引中占位
    fn reserve_id(&self, group: &str) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            match self.ids.entry(id.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(group.to_string());
                    return id;
                }
                Entry::Occupied(_) => {
                    tracing::error!(
                        instance_id = %id,
                        "Generated instance id already in use, regenerating"
                    );
                }
            }
        }
    }

    fn group(&self, group: &str) -> Option<GroupInstances> {
        self.groups.get(group).map(|entry| entry.value().clone())
    }

    fn group_or_create(&self, group: &str) -> GroupInstances {
        self.groups.entry(group.to_string()).or_default().clone()
    }

    fn sorted_groups(&self) -> Vec<(String, GroupInstances)> {
        let mut groups: Vec<_> = self
            .groups
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        groups
    }
}

fn sorted<'a>(instances: impl Iterator<Item = &'a Instance>) -> Vec<Instance> {
    let mut instances: Vec<Instance> = instances.cloned().collect();
    instances.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    instances
}
