//! 主应用程序入口
//!
//! 打开存储、组装服务并启动 Axum Web API 服务。

use std::{env, sync::Arc};

use application::{
    ChatService, ChatServiceDependencies, HubRegistry, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 生产环境必须显式提供 JWT_SECRET
    let config = match env::var("APP_ENV").as_deref() {
        Ok("production") => AppConfig::from_env()?,
        _ => AppConfig::from_env_with_defaults(),
    };
    config.validate()?;

    let infra = Infrastructure::open(&config)?;
    let secret_verifier = infra.secret_verifier_trait();
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: infra.repository.clone(),
        credentials: jwt_service,
        secret_verifier: secret_verifier.clone(),
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        room_repository: infra.repository.clone(),
        message_repository: infra.repository.clone(),
        user_repository: infra.repository.clone(),
        secret_verifier,
        clock: Arc::new(SystemClock),
        hubs: Arc::new(HubRegistry::new(config.hub.clone())),
    });

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        config.websocket.clone(),
    );

    // 启动 Web 服务器
    let app = router(state);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(address = %address, database = %config.database.path, "聊天室服务器已启动");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
