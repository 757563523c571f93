use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 消息键中的时间戳格式：定宽、纳秒精度，字典序即时间序。
pub const TIMESTAMP_KEY_FORMAT: &str = "%Y%m%d%H%M%S%.9f";

/// 把时间戳格式化为 `YYYYMMDDHHMMSS.fffffffff`。
pub fn timestamp_key(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_KEY_FORMAT).to_string()
}

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// 生成新的随机标识
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse_str(value: &str) -> Result<Self, DomainError> {
                Uuid::parse_str(value)
                    .map(Self)
                    .map_err(|_| DomainError::invalid_argument(stringify!($name), "not a valid uuid"))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

uuid_identifier!(
    /// 用户唯一标识。
    UserId
);
uuid_identifier!(
    /// 聊天室唯一标识。
    RoomId
);
uuid_identifier!(
    /// 消息唯一标识。
    MessageId
);

/// 经过验证的用户名：3-32 个字母、数字或下划线。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 32;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.len() < Self::MIN_LEN {
            return Err(DomainError::invalid_argument("username", "too short"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("username", "too long"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DomainError::invalid_argument(
                "username",
                "only letters, digits and '_' are allowed",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 聊天室名称，同时是聊天室对外的主键。
///
/// 只允许 5-50 个 ASCII 字母数字，因此组合键里的 `-` 分隔符不会出现在名称内部。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    pub const MIN_LEN: usize = 5;
    pub const MAX_LEN: usize = 50;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.len() < Self::MIN_LEN || value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument(
                "room_name",
                "must be between 5 and 50 characters",
            ));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::invalid_argument(
                "room_name",
                "only ASCII letters and digits are allowed",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 明文密码，只在进入哈希之前短暂存在。
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub const MIN_LEN: usize = 8;
    /// bcrypt 只使用前 72 字节
    pub const MAX_LEN: usize = 72;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.len() < Self::MIN_LEN {
            return Err(DomainError::invalid_argument("password", "too short"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("password", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// 经过规范化和校验的消息正文。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageContent(String);

impl MessageContent {
    pub const MAX_LEN: usize = 512;

    /// 换行替换为空格后去除首尾空白，再做长度校验。
    pub fn parse(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let value = normalize_inbound(value.as_ref());
        if value.is_empty() {
            return Err(DomainError::invalid_argument("content", "cannot be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument(
                "content",
                "exceeds 512 bytes",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// 客户端上行消息的规范化
pub fn normalize_inbound(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ").trim().to_owned()
}
