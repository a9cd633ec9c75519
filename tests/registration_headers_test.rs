use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::post;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

use lease_registry::services::client::{
    DiscoveryClient, DiscoveryClientConfig, DiscoveryError, LeaseGrant, LeaseManager, LeaseStatus,
    RegistryApi,
};
use lease_registry::services::registry::EXPIRED_TIME_HEADER;

// 只实现 POST /{group} 的桩注册中心，按参数返回 201 和指定的响应头
async fn stub_registry(
    location: Option<&'static str>,
    hint: Option<&'static str>,
    delay: Duration,
) -> SocketAddr {
    let app = Router::new().route(
        "/{group}",
        post(move || async move {
            sleep(delay).await;
            let mut headers = HeaderMap::new();
            if let Some(location) = location {
                headers.insert(header::LOCATION, HeaderValue::from_static(location));
            }
            if let Some(hint) = hint {
                headers.insert(EXPIRED_TIME_HEADER, HeaderValue::from_static(hint));
            }
            (StatusCode::CREATED, headers)
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    addr
}

fn api(addr: SocketAddr) -> RegistryApi {
    RegistryApi::new(&DiscoveryClientConfig {
        registry_url: format!("http://{addr}"),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn missing_hint_means_no_heartbeat() {
    let addr = stub_registry(Some("/g/stub-id"), None, Duration::ZERO).await;

    let grant = api(addr).create("g", None).await.unwrap();
    assert_eq!(
        grant,
        LeaseGrant {
            id: "stub-id".to_string(),
            heartbeat_hint: 0
        }
    );

    let client = DiscoveryClient::builder()
        .url(addr.to_string())
        .group("g")
        .register()
        .await
        .unwrap();
    assert_eq!(client.id(), "stub-id");
    assert_eq!(
        client.status().await,
        LeaseStatus::Registered {
            heartbeating: false
        }
    );
}

#[tokio::test]
async fn malformed_hint_fails_registration() {
    let addr = stub_registry(Some("/g/stub-id"), Some("soon"), Duration::ZERO).await;

    let err = api(addr).create("g", None).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::RegistrationFailed(_)));
}

#[tokio::test]
async fn missing_or_empty_location_fails_registration() {
    for location in [None, Some(""), Some("/g/")] {
        let addr = stub_registry(location, Some("5"), Duration::ZERO).await;

        let err = api(addr).create("g", None).await.unwrap_err();
        assert!(
            matches!(err, DiscoveryError::RegistrationFailed(_)),
            "location {location:?} gave {err:?}"
        );
    }
}

#[tokio::test]
async fn failed_registration_can_be_retried() {
    let addr = stub_registry(None, Some("5"), Duration::ZERO).await;
    let lease = LeaseManager::new(api(addr), "g");

    assert!(matches!(
        lease.register(None).await,
        Err(DiscoveryError::RegistrationFailed(_))
    ));
    assert_eq!(lease.status().await, LeaseStatus::Unregistered);
    assert_eq!(lease.id().await, None);
}

#[tokio::test]
async fn status_stays_readable_while_registering() {
    let addr = stub_registry(Some("/g/slow-id"), Some("0"), Duration::from_millis(500)).await;
    let lease = Arc::new(LeaseManager::new(api(addr), "g"));

    let registering = tokio::spawn({
        let lease = lease.clone();
        async move { lease.register(None).await }
    });

    timeout(Duration::from_millis(300), async {
        while lease.status().await != LeaseStatus::Registering {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("status blocked while registration was in flight");

    assert!(matches!(
        lease.register(None).await,
        Err(DiscoveryError::IllegalState(_))
    ));

    assert_eq!(registering.await.unwrap().unwrap(), "slow-id");
    assert_eq!(
        lease.status().await,
        LeaseStatus::Registered {
            heartbeating: false
        }
    );
}
