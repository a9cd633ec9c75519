use std::time::Duration;

/// 发现客户端配置
#[derive(Debug, Clone)]
pub struct DiscoveryClientConfig {
    /// 注册中心地址，格式 `[http://]host[:port][/prefix]`
    pub registry_url: String,
    /// 本实例所属分组
    pub group: String,
    /// 连接超时时间
    pub connect_timeout: Duration,
    /// 单次请求超时时间
    pub request_timeout: Duration,
}

impl Default for DiscoveryClientConfig {
    fn default() -> Self {
        Self {
            registry_url: "http://localhost:8090".to_string(),
            group: "default".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DiscoveryClientConfig {
    /// 规范化后的注册中心地址：补全协议并去掉末尾的 `/`
    pub fn base_url(&self) -> String {
        let url = self.registry_url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{url}")
        }
    }
}
