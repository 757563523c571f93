//! 持久层
//!
//! 在存储引擎之上维护多个分区之间的一致性：每个操作都在单个事务中完成，
//! 任何一步失败都会回滚整个事务。

mod chatrooms;
mod invitations;
mod members;
mod messages;
mod presence;
mod users;

use std::sync::Arc;

use domain::{
    membership_key, MemberRole, RepositoryError, RepositoryResult, RoomName, SecretVerifier,
    UserId,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::storage::{KvRead, Partition, Store};

pub struct ChatDatabase {
    store: Store,
    verifier: Arc<dyn SecretVerifier>,
}

impl ChatDatabase {
    /// `verifier` 用于加入私有聊天室时比较邀请密钥
    pub fn new(store: Store, verifier: Arc<dyn SecretVerifier>) -> Self {
        Self { store, verifier }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

fn encode<T: Serialize>(value: &T) -> RepositoryResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| RepositoryError::encoding(err.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> RepositoryResult<T> {
    serde_json::from_slice(bytes).map_err(|err| RepositoryError::decoding(err.to_string()))
}

fn decode_text(bytes: &[u8]) -> RepositoryResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|err| RepositoryError::decoding(err.to_string()))
}

fn decode_role(bytes: &[u8]) -> RepositoryResult<MemberRole> {
    bytes
        .first()
        .copied()
        .and_then(MemberRole::from_byte)
        .ok_or_else(|| RepositoryError::decoding("invalid member role byte"))
}

/// 查询成员角色，没有成员记录时返回 `None`
fn role_in(tx: &impl KvRead, room: &RoomName, user: &UserId) -> RepositoryResult<Option<MemberRole>> {
    tx.get(
        Partition::ChatroomMembers,
        membership_key(room, user).as_bytes(),
    )?
    .map(|bytes| decode_role(&bytes))
    .transpose()
}

/// 角色不满足 `allowed` 或无法解析时返回 `AuthorizationFailed`
fn authorize(
    tx: &impl KvRead,
    room: &RoomName,
    user: &UserId,
    action: &str,
    allowed: impl Fn(MemberRole) -> bool,
) -> RepositoryResult<MemberRole> {
    match role_in(tx, room, user)? {
        Some(role) if allowed(role) => Ok(role),
        _ => Err(RepositoryError::authorization_failed(action)),
    }
}
