use serde::{Deserialize, Serialize};

use crate::value_objects::{UserId, Username};

/// 用户实体，按 `user_id` 存放在 Users / DeactivatedUsers 分区。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub user_name: Username,
    pub hashed_password: String,
}

impl User {
    pub fn new(user_id: UserId, user_name: Username, hashed_password: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name,
            hashed_password: hashed_password.into(),
        }
    }
}

/// 当前有效的访问令牌，每个用户最多一条，重新签发即覆盖。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub token: String,
}

impl UserToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// 账户在线标志的单字节编码
pub fn online_flag_to_bytes(online: bool) -> [u8; 1] {
    if online {
        [1]
    } else {
        [0]
    }
}

pub fn online_flag_from_bytes(bytes: &[u8]) -> bool {
    bytes.first() == Some(&1)
}
