use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use http::{HeaderName, StatusCode, header};
use serde_json::Value;

use super::error::RegistryError;
use super::service::RegistrationService;
use super::store::RegistrySnapshot;
use super::types::{Instance, Metadata};

/// 注册响应中携带推荐心跳间隔（秒）的头部
pub const EXPIRED_TIME_HEADER: &str = "x-expired-time";

/// HTTP 层错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Invalid metadata body: {0}")]
    InvalidBody(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Registry(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
        };
        tracing::debug!(status = %status, error = %self, "Request rejected");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// 构建注册表的 REST 路由
pub fn router(service: RegistrationService) -> Router {
    Router::new()
        .route("/", get(read_all))
        .route("/{group}", get(read_group).post(create))
        .route(
            "/{group}/{id}",
            get(read_instance).put(update).delete(delete),
        )
        .with_state(service)
}

async fn create(
    State(service): State<RegistrationService>,
    Path(group): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let meta = parse_metadata(&body)?;
    let registration = service.create(&group, meta).await;

    let headers = [
        (header::LOCATION, registration.location()),
        (
            HeaderName::from_static(EXPIRED_TIME_HEADER),
            registration.heartbeat_hint.to_string(),
        ),
    ];
    Ok((StatusCode::CREATED, headers, Json(registration.instance)))
}

async fn read_group(
    State(service): State<RegistrationService>,
    Path(group): Path<String>,
) -> Result<Json<Vec<Instance>>, ApiError> {
    Ok(Json(service.read_group(&group).await?))
}

async fn read_instance(
    State(service): State<RegistrationService>,
    Path((group, id)): Path<(String, String)>,
) -> Result<Json<Instance>, ApiError> {
    Ok(Json(service.read_instance(&group, &id).await?))
}

async fn read_all(State(service): State<RegistrationService>) -> Json<RegistrySnapshot> {
    Json(service.read_all().await)
}

async fn update(
    State(service): State<RegistrationService>,
    Path((group, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Instance>, ApiError> {
    let meta = parse_metadata(&body)?;
    Ok(Json(service.update(&group, &id, meta).await?))
}

async fn delete(
    State(service): State<RegistrationService>,
    Path((group, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    service.delete(&group, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// 空请求体或 `null` 视为未携带元数据，其余必须是 JSON 对象
fn parse_metadata(body: &[u8]) -> Result<Option<Metadata>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    match serde_json::from_slice(body) {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Object(meta)) => Ok(Some(meta)),
        Ok(other) => Err(ApiError::InvalidBody(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ApiError::InvalidBody(e.to_string())),
    }
}
