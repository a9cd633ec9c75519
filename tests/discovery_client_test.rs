use std::net::SocketAddr;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use lease_registry::server;
use lease_registry::services::client::{
    DiscoveryClient, DiscoveryClientConfig, DiscoveryError, LeaseStatus, RegistryApi,
};
use lease_registry::services::registry::{LeaseConfig, Metadata};

struct TestRegistry {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TestRegistry {
    async fn start(ttl_seconds: i64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(server::serve(
            listener,
            LeaseConfig::new(ttl_seconds),
            shutdown.clone(),
        ));
        Self { addr, shutdown }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn api(&self) -> RegistryApi {
        RegistryApi::new(&DiscoveryClientConfig {
            registry_url: self.url(),
            ..Default::default()
        })
        .unwrap()
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn meta(value: serde_json::Value) -> Metadata {
    value.as_object().cloned().unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn register_and_query_through_facade() {
    let registry = TestRegistry::start(30).await;

    // 地址不带协议时自动补全 http://
    let client = DiscoveryClient::builder()
        .url(registry.addr.to_string())
        .group("orders")
        .meta(meta(json!({"port": 9000})))
        .register()
        .await
        .unwrap();

    assert_eq!(client.group_name(), "orders");
    assert_eq!(
        client.status().await,
        LeaseStatus::Registered { heartbeating: true }
    );
    assert_eq!(
        client.lease().heartbeat_interval().await,
        Some(Duration::from_secs(29))
    );

    let me = client.me().await.unwrap();
    assert_eq!(me.id, client.id());
    assert_eq!(me.group, "orders");
    assert_eq!(me.meta, Some(meta(json!({"port": 9000}))));

    let other = DiscoveryClient::builder()
        .url(registry.url())
        .group("billing")
        .register()
        .await
        .unwrap();

    assert_eq!(client.own_group().await.unwrap().len(), 1);
    assert_eq!(client.group("billing").await.unwrap()[0].id, other.id());
    assert_eq!(
        client.instance("billing", other.id()).await.unwrap().meta,
        None
    );

    let all = client.all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all["orders"].len(), 1);
    assert_eq!(all["billing"].len(), 1);

    assert!(client.group("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn first_heartbeat_fires_immediately() {
    let registry = TestRegistry::start(30).await;
    let client = DiscoveryClient::builder()
        .url(registry.url())
        .register()
        .await
        .unwrap();

    assert_eq!(client.group_name(), "default");
    wait_until(|| client.lease().stats().succeeded() >= 1).await;

    let me = client.me().await.unwrap();
    assert!(me.modified > me.created);
}

#[tokio::test]
async fn disabled_lease_registers_without_heartbeat() {
    let registry = TestRegistry::start(0).await;
    let client = DiscoveryClient::builder()
        .url(registry.url())
        .register()
        .await
        .unwrap();

    assert_eq!(
        client.status().await,
        LeaseStatus::Registered {
            heartbeating: false
        }
    );
    assert_eq!(client.lease().heartbeat_interval().await, None);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(client.lease().stats().succeeded(), 0);

    let me = client.me().await.unwrap();
    assert_eq!(me.created, me.modified);
}

#[tokio::test]
async fn update_replaces_metadata() {
    let registry = TestRegistry::start(0).await;
    let client = DiscoveryClient::builder()
        .url(registry.url())
        .meta(meta(json!({"a": 1})))
        .register()
        .await
        .unwrap();

    let updated = client.update(meta(json!({"b": 2}))).await.unwrap();
    assert_eq!(updated.meta, Some(meta(json!({"b": 2}))));
    assert_eq!(client.me().await.unwrap().meta, Some(meta(json!({"b": 2}))));

    let refreshed = client.refresh().await.unwrap();
    assert_eq!(refreshed.meta, Some(meta(json!({"b": 2}))));
    assert!(refreshed.modified > updated.modified);
}

#[tokio::test]
async fn heartbeats_keep_lease_alive_and_silence_expires_it() {
    let registry = TestRegistry::start(2).await;

    // 只注册不发心跳
    let silent = registry.api().create("g", None).await.unwrap();
    assert_eq!(silent.heartbeat_hint, 1);

    let alive = DiscoveryClient::builder()
        .url(registry.url())
        .group("g")
        .register()
        .await
        .unwrap();
    assert_eq!(
        alive.lease().heartbeat_interval().await,
        Some(Duration::from_secs(1))
    );

    sleep(Duration::from_millis(4500)).await;

    let err = registry.api().instance("g", &silent.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(alive.me().await.is_ok());
    assert!(alive.lease().stats().succeeded() >= 4);
}

#[tokio::test]
async fn deregister_stops_heartbeat_and_locks_lifecycle() {
    let registry = TestRegistry::start(2).await;
    let client = DiscoveryClient::builder()
        .url(registry.url())
        .register()
        .await
        .unwrap();
    wait_until(|| client.lease().stats().succeeded() >= 1).await;

    client.deregister().await.unwrap();
    assert_eq!(client.status().await, LeaseStatus::Deregistered);
    assert_eq!(client.lease().id().await, None);
    assert!(client.me().await.unwrap_err().is_not_found());

    let beats = client.lease().stats().succeeded();
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(client.lease().stats().succeeded(), beats);
    assert_eq!(client.lease().stats().failed(), 0);

    assert!(matches!(
        client.deregister().await,
        Err(DiscoveryError::IllegalState(_))
    ));
    assert!(matches!(
        client.refresh().await,
        Err(DiscoveryError::IllegalState(_))
    ));
    assert!(matches!(
        client.update(Metadata::new()).await,
        Err(DiscoveryError::IllegalState(_))
    ));

    // 服务端层面的第二次删除返回 NotFound
    let err = registry.api().delete("default", client.id()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn deregister_of_vanished_lease_reports_not_found() {
    let registry = TestRegistry::start(0).await;
    let client = DiscoveryClient::builder()
        .url(registry.url())
        .register()
        .await
        .unwrap();

    registry.api().delete("default", client.id()).await.unwrap();

    assert!(client.deregister().await.unwrap_err().is_not_found());
    assert_eq!(client.status().await, LeaseStatus::Deregistered);
}

#[tokio::test]
async fn failed_heartbeats_do_not_cancel_the_schedule() {
    let registry = TestRegistry::start(2).await;
    let client = DiscoveryClient::builder()
        .url(registry.url())
        .register()
        .await
        .unwrap();
    wait_until(|| client.lease().stats().succeeded() >= 1).await;

    registry.api().delete("default", client.id()).await.unwrap();

    wait_until(|| client.lease().stats().failed() >= 1).await;
    let failed = client.lease().stats().failed();
    wait_until(|| client.lease().stats().failed() > failed).await;
    assert_eq!(
        client.status().await,
        LeaseStatus::Registered { heartbeating: true }
    );
}

#[tokio::test]
async fn registration_against_wrong_endpoint_fails() {
    let registry = TestRegistry::start(30).await;
    let err = DiscoveryClient::builder()
        .url(format!("{}/not/a/registry", registry.url()))
        .register()
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::RegistrationFailed(_)));
}

#[tokio::test]
async fn unreachable_registry_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = DiscoveryClient::builder()
        .url(format!("http://{addr}"))
        .connect_timeout(Duration::from_secs(1))
        .register()
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::Transport(_)));
}

#[tokio::test]
async fn non_ascii_group_registers_and_deregisters() {
    let registry = TestRegistry::start(30).await;
    let client = DiscoveryClient::builder()
        .url(registry.url())
        .group("grüppe")
        .register()
        .await
        .unwrap();

    assert_eq!(client.group_name(), "grüppe");
    let me = client.me().await.unwrap();
    assert_eq!(me.group, "grüppe");
    assert_eq!(me.id, client.id());
    assert_eq!(client.group("grüppe").await.unwrap().len(), 1);
    wait_until(|| client.lease().stats().succeeded() >= 1).await;

    client.deregister().await.unwrap();
    assert!(client.group("grüppe").await.unwrap().is_empty());
}
