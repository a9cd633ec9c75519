use http::{HeaderMap, StatusCode, header};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;

use super::config::DiscoveryClientConfig;
use super::error::DiscoveryError;
use crate::services::registry::{EXPIRED_TIME_HEADER, Instance, Metadata, RegistrySnapshot};

/// 注册成功后从响应中解析出的租约信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseGrant {
    pub id: String,
    /// 推荐的心跳间隔（秒），0 表示无需心跳
    pub heartbeat_hint: u64,
}

/// 注册中心 REST 接口的远程句柄
#[derive(Debug, Clone)]
pub struct RegistryApi {
    base_url: Url,
    client: reqwest::Client,
}

impl RegistryApi {
    pub fn new(config: &DiscoveryClientConfig) -> Result<Self, DiscoveryError> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|e| DiscoveryError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST /{group}：单次注册尝试，不做内部重试
    pub async fn create(
        &self,
        group: &str,
        meta: Option<&Metadata>,
    ) -> Result<LeaseGrant, DiscoveryError> {
        let mut request = self.client.post(self.endpoint(&[group])?);
        if let Some(meta) = meta {
            request = request.json(meta);
        }
        let response = request.send().await?;

        if response.status() != StatusCode::CREATED {
            return Err(DiscoveryError::RegistrationFailed(format!(
                "status: {}",
                response.status()
            )));
        }

        parse_grant(response.headers())
    }

    /// GET /{group}
    pub async fn group(&self, group: &str) -> Result<Vec<Instance>, DiscoveryError> {
        let response = self.client.get(self.endpoint(&[group])?).send().await?;
        Self::json(response, "list group", || format!("group {group}")).await
    }

    /// GET /{group}/{id}
    pub async fn instance(&self, group: &str, id: &str) -> Result<Instance, DiscoveryError> {
        let response = self.client.get(self.endpoint(&[group, id])?).send().await?;
        Self::json(response, "get instance", || format!("instance {group}/{id}")).await
    }

    /// GET /
    pub async fn all(&self) -> Result<RegistrySnapshot, DiscoveryError> {
        let response = self.client.get(self.endpoint(&[""])?).send().await?;
        Self::json(response, "list all", || "registry root".to_string()).await
    }

    /// PUT /{group}/{id}：刷新修改时间，携带元数据时整体替换
    pub async fn touch(
        &self,
        group: &str,
        id: &str,
        meta: Option<&Metadata>,
    ) -> Result<Instance, DiscoveryError> {
        let mut request = self.client.put(self.endpoint(&[group, id])?);
        if let Some(meta) = meta {
            request = request.json(meta);
        }
        let response = request.send().await?;
        Self::json(response, "update instance", || format!("instance {group}/{id}")).await
    }

    /// DELETE /{group}/{id}
    pub async fn delete(&self, group: &str, id: &str) -> Result<(), DiscoveryError> {
        let response = self
            .client
            .delete(self.endpoint(&[group, id])?)
            .send()
            .await?;
        Self::check(response, "delete instance", || format!("instance {group}/{id}"))?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DiscoveryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DiscoveryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn check(
        response: Response,
        operation: &'static str,
        missing: impl FnOnce() -> String,
    ) -> Result<Response, DiscoveryError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(DiscoveryError::NotFound(missing())),
            status => Err(DiscoveryError::UnexpectedStatus { operation, status }),
        }
    }

    async fn json<T: DeserializeOwned>(
        response: Response,
        operation: &'static str,
        missing: impl FnOnce() -> String,
    ) -> Result<T, DiscoveryError> {
        Ok(Self::check(response, operation, missing)?.json().await?)
    }
}

// 从注册响应头中解析租约：ID 取自 `Location` 最后一个路径段，缺少心跳头时视为 0
fn parse_grant(headers: &HeaderMap) -> Result<LeaseGrant, DiscoveryError> {
    let location = headers
        .get(header::LOCATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .ok_or_else(|| {
            DiscoveryError::RegistrationFailed("there is no 'Location' header".to_string())
        })?;

    let id = location
        .rsplit('/')
        .next()
        .and_then(|segment| urlencoding::decode(segment).ok())
        .map(|id| id.into_owned())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            DiscoveryError::RegistrationFailed(format!(
                "no instance id in 'Location' header: {location:?}"
            ))
        })?;

    let heartbeat_hint = match headers.get(EXPIRED_TIME_HEADER) {
        None => 0,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|hint| hint.trim().parse::<i64>().ok())
            .map(|hint| hint.max(0) as u64)
            .ok_or_else(|| {
                DiscoveryError::RegistrationFailed(format!(
                    "malformed '{EXPIRED_TIME_HEADER}' header"
                ))
            })?,
    };

    Ok(LeaseGrant { id, heartbeat_hint })
}
