use std::time::Duration;

use super::api::RegistryApi;
use super::config::DiscoveryClientConfig;
use super::error::DiscoveryError;
use super::lease::{LeaseManager, LeaseStatus};
use crate::services::registry::{Instance, Metadata, RegistrySnapshot};

/// 服务发现客户端
///
/// 查询操作直接访问注册中心，注册、更新、注销委托给 [`LeaseManager`]。
/// 除自身租约的分组和ID外不保存其他状态。
#[derive(Debug)]
pub struct DiscoveryClient {
    api: RegistryApi,
    lease: LeaseManager,
    id: String,
}

impl DiscoveryClient {
    pub fn builder() -> DiscoveryClientBuilder {
        DiscoveryClientBuilder::default()
    }

    /// 按配置注册并返回客户端，心跳按服务端提示自动启动
    pub async fn register(
        config: DiscoveryClientConfig,
        meta: Option<Metadata>,
    ) -> Result<Self, DiscoveryError> {
        let api = RegistryApi::new(&config)?;
        let lease = LeaseManager::new(api.clone(), config.group);
        let id = lease.register(meta.as_ref()).await?;
        Ok(Self { api, lease, id })
    }

    pub fn group_name(&self) -> &str {
        self.lease.group()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lease(&self) -> &LeaseManager {
        &self.lease
    }

    pub async fn status(&self) -> LeaseStatus {
        self.lease.status().await
    }

    /// 读取本实例在注册中心的当前记录
    pub async fn me(&self) -> Result<Instance, DiscoveryError> {
        self.api.instance(self.group_name(), &self.id).await
    }

    pub async fn group(&self, name: &str) -> Result<Vec<Instance>, DiscoveryError> {
        self.api.group(name).await
    }

    /// 本实例所在分组的全部实例
    pub async fn own_group(&self) -> Result<Vec<Instance>, DiscoveryError> {
        self.api.group(self.group_name()).await
    }

    pub async fn instance(&self, group: &str, id: &str) -> Result<Instance, DiscoveryError> {
        self.api.instance(group, id).await
    }

    pub async fn all(&self) -> Result<RegistrySnapshot, DiscoveryError> {
        self.api.all().await
    }

    /// 刷新租约并整体替换元数据
    pub async fn update(&self, meta: Metadata) -> Result<Instance, DiscoveryError> {
        self.lease.update_metadata(&meta).await
    }

    /// 刷新租约，不修改元数据
    pub async fn refresh(&self) -> Result<Instance, DiscoveryError> {
        self.lease.refresh().await
    }

    pub async fn deregister(&self) -> Result<(), DiscoveryError> {
        self.lease.deregister().await
    }
}

/// [`DiscoveryClient`] 构建器
#[derive(Debug, Clone, Default)]
pub struct DiscoveryClientBuilder {
    config: DiscoveryClientConfig,
    meta: Option<Metadata>,
}

impl DiscoveryClientBuilder {
    /// 注册中心地址，格式 `[http://]host[:port][/prefix]`
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.registry_url = url.into();
        self
    }

    /// 所属分组，默认 `default`
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.config.group = group.into();
        self
    }

    /// 注册时携带的初始元数据
    pub fn meta(mut self, meta: Metadata) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn config(mut self, config: DiscoveryClientConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn register(self) -> Result<DiscoveryClient, DiscoveryError> {
        DiscoveryClient::register(self.config, self.meta).await
    }
}
