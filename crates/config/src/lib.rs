//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 存储文件路径
//! - JWT认证
//! - 房间广播中心与 WebSocket 连接参数
//! - 服务设置

use serde::{Deserialize, Serialize};
use std::env;

/// 开发环境使用的 JWT 密钥，`validate` 遇到它时会打印警告
const DEV_JWT_SECRET: &str = "dev-secret-key-not-for-production-use-minimum-32-chars";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 存储配置
    pub database: DatabaseConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    /// 广播中心配置
    pub hub: HubConfig,
    /// WebSocket 连接配置
    pub websocket: WebSocketConfig,
    /// 服务配置
    pub server: ServerConfig,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// redb 存储文件路径
    pub path: String,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

/// 广播中心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// 每个连接的出站队列容量，队列写满的连接会被剔除
    pub client_queue: usize,
    /// register / unregister / broadcast 三个协调队列的容量
    pub channel_capacity: usize,
}

/// WebSocket 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// 读超时（秒），每次收到 pong 刷新
    pub pong_wait_secs: u64,
    /// 单次写超时（秒）
    pub write_wait_secs: u64,
    /// 单条消息正文上限（字节），不含元数据开销
    pub max_message_size: usize,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub bcrypt_cost: Option<u32>,
}

impl WebSocketConfig {
    /// 每条消息允许附带的元数据开销
    pub const METADATA_OVERHEAD: usize = 64;

    /// 读端实际允许的单帧大小
    pub fn read_limit(&self) -> usize {
        self.max_message_size + Self::METADATA_OVERHEAD
    }

    /// 心跳周期为读超时的 90%，保证 ping 先于对端超时到达
    pub fn ping_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pong_wait_secs * 900)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            pong_wait_secs: 60,
            write_wait_secs: 10,
            max_message_size: 512,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue: 256,
            channel_capacity: 1024,
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    /// 缺少 JWT_SECRET 时返回错误，确保生产环境不会使用不安全的默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), true)
    }

    /// 从环境变量加载配置，开发环境版本
    /// 提供不安全的默认值，仅用于测试和开发
    pub fn from_env_with_defaults() -> Self {
        // 非严格模式下不会产生错误
        Self::from_lookup(|key| env::var(key).ok(), false).unwrap_or_else(|_| Self::fallback())
    }

    /// 按给定的查找函数构建配置，便于在测试中替换环境变量来源
    pub fn from_lookup<F>(lookup: F, strict: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = match lookup("JWT_SECRET") {
            Some(secret) => secret,
            None if strict => return Err(ConfigError::MissingVar("JWT_SECRET")),
            None => DEV_JWT_SECRET.to_string(),
        };

        let defaults = Self::fallback();
        Ok(Self {
            database: DatabaseConfig {
                path: lookup("DATABASE_PATH").unwrap_or(defaults.database.path),
            },
            jwt: JwtConfig {
                secret,
                expiration_hours: parse(lookup("JWT_EXPIRATION_HOURS"))
                    .unwrap_or(defaults.jwt.expiration_hours),
            },
            hub: HubConfig {
                client_queue: parse(lookup("HUB_CLIENT_QUEUE")).unwrap_or(defaults.hub.client_queue),
                channel_capacity: parse(lookup("HUB_CHANNEL_CAPACITY"))
                    .unwrap_or(defaults.hub.channel_capacity),
            },
            websocket: WebSocketConfig {
                pong_wait_secs: parse(lookup("WS_PONG_WAIT_SECS"))
                    .unwrap_or(defaults.websocket.pong_wait_secs),
                write_wait_secs: parse(lookup("WS_WRITE_WAIT_SECS"))
                    .unwrap_or(defaults.websocket.write_wait_secs),
                max_message_size: parse(lookup("WS_MAX_MESSAGE_SIZE"))
                    .unwrap_or(defaults.websocket.max_message_size),
            },
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse(lookup("SERVER_PORT")).unwrap_or(defaults.server.port),
                bcrypt_cost: parse(lookup("BCRYPT_COST")),
            },
        })
    }

    fn fallback() -> Self {
        Self {
            database: DatabaseConfig {
                path: "chatroom.redb".to_string(),
            },
            jwt: JwtConfig {
                secret: DEV_JWT_SECRET.to_string(),
                expiration_hours: 72,
            },
            hub: HubConfig::default(),
            websocket: WebSocketConfig::default(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                bcrypt_cost: None,
            },
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Database path cannot be empty".to_string(),
            ));
        }

        // 验证JWT密钥长度（至少256位/32字节）
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.jwt.secret == DEV_JWT_SECRET {
            eprintln!("⚠️ WARNING: Using development JWT secret!");
        }

        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT expiration must be a positive number of hours".to_string(),
            ));
        }

        if self.hub.client_queue == 0 || self.hub.channel_capacity == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "Hub queue capacities must be greater than 0".to_string(),
            ));
        }

        if self.websocket.pong_wait_secs == 0 || self.websocket.max_message_size == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "WebSocket pong wait and message size must be greater than 0".to_string(),
            ));
        }

        if let Some(cost) = self.server.bcrypt_cost {
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::InvalidServerConfig(
                    "bcrypt cost must be between 4 and 31".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|s| s.parse().ok())
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    fn default() -> Self {
        Self::fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup_from(&[]), false).unwrap();
        assert_eq!(config.database.path, "chatroom.redb");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.jwt.expiration_hours, 72);
        assert_eq!(config.hub.client_queue, 256);
        assert_eq!(config.websocket.read_limit(), 512 + 64);
    }

    #[test]
    fn test_strict_mode_requires_jwt_secret() {
        let result = AppConfig::from_lookup(lookup_from(&[]), true);
        assert!(matches!(result, Err(ConfigError::MissingVar("JWT_SECRET"))));
    }

    #[test]
    fn test_values_are_read_from_lookup() {
        let config = AppConfig::from_lookup(
            lookup_from(&[
                ("JWT_SECRET", "production-secret-key-with-at-least-32-characters"),
                ("DATABASE_PATH", "/var/lib/chat/data.redb"),
                ("SERVER_PORT", "9000"),
                ("HUB_CLIENT_QUEUE", "8"),
                ("WS_PONG_WAIT_SECS", "30"),
                ("BCRYPT_COST", "12"),
            ]),
            true,
        )
        .unwrap();

        assert_eq!(config.database.path, "/var/lib/chat/data.redb");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.hub.client_queue, 8);
        assert_eq!(config.server.bcrypt_cost, Some(12));
        assert_eq!(config.websocket.ping_period().as_secs(), 27);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("SERVER_PORT", "not-a-port")]), false).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());

        config.jwt.secret = "production-grade-secret-key-with-sufficient-length".to_string();
        config.hub.client_queue = 0;
        assert!(config.validate().is_err());

        config.hub.client_queue = 16;
        config.server.bcrypt_cost = Some(2);
        assert!(config.validate().is_err());

        config.server.bcrypt_cost = Some(10);
        assert!(config.validate().is_ok());
    }
}
