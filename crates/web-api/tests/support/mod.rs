#![allow(dead_code)]

use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, HubRegistry, SystemClock, UserService,
    UserServiceDependencies,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use config::HubConfig;
use infrastructure::Infrastructure;
use serde_json::Value;
use tower::ServiceExt;
use web_api::{router, AppState, JwtConfig, JwtService, WebSocketConfig};

pub fn build_router() -> Router {
    build_router_with(WebSocketConfig::default())
}

/// 内存存储 + 最低 bcrypt 成本，其余组件与生产环境一致
pub fn build_router_with(websocket: WebSocketConfig) -> Router {
    let infra = Infrastructure::in_memory(Some(4)).expect("in-memory storage");
    let secret_verifier = infra.secret_verifier_trait();
    let credentials = Arc::new(JwtService::new(JwtConfig {
        secret: "test-secret-key-with-at-least-32-characters".to_string(),
        expiration_hours: 24,
    }));

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: infra.repository.clone(),
        credentials,
        secret_verifier: secret_verifier.clone(),
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        room_repository: infra.repository.clone(),
        message_repository: infra.repository.clone(),
        user_repository: infra.repository.clone(),
        secret_verifier,
        clock: Arc::new(SystemClock),
        hubs: Arc::new(HubRegistry::new(HubConfig::default())),
    });

    router(AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        websocket,
    ))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();

    TestResponse {
        status,
        content_type,
        body,
    }
}

/// 注册用户，返回 (user_id, token)
pub async fn signup(app: &Router, username: &str) -> (String, String) {
    let response = send(
        app,
        Method::POST,
        "/api/v1/auth/signup",
        None,
        Some(serde_json::json!({ "username": username, "password": "password123" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "signup {username}");
    let body = response.json();
    (
        body["user_id"].as_str().expect("user_id").to_owned(),
        body["token"].as_str().expect("token").to_owned(),
    )
}
