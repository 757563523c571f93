//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的用例服务。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{bearer_token, Claims, JwtService};
pub use config::{JwtConfig, WebSocketConfig};
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
