use domain::{
    LivePresence, LiveStatus, MemberRole, RepositoryError, RepositoryResult, RoomName, UserId,
    Username,
};
use tracing::debug;

use super::{authorize, decode, decode_text, encode, ChatDatabase};
use crate::storage::{KvRead, Partition, WriteTx};

fn load_presence(tx: &impl KvRead, room: &RoomName) -> RepositoryResult<LivePresence> {
    match tx.get(Partition::LiveMember, room.as_str().as_bytes())? {
        Some(bytes) => decode(&bytes),
        None => Ok(LivePresence::new()),
    }
}

fn store_status(
    tx: &WriteTx,
    room: &RoomName,
    username: &Username,
    status: LiveStatus,
) -> RepositoryResult<LivePresence> {
    let mut presence = load_presence(tx, room)?;
    presence.apply(username.as_str(), status);

    let key = room.as_str().as_bytes();
    if presence.is_empty() {
        tx.delete(Partition::LiveMember, key)?;
    } else {
        tx.put(Partition::LiveMember, key, &encode(&presence)?)?;
    }
    Ok(presence)
}

impl ChatDatabase {
    /// 更新用户在聊天室内的实时状态，返回更新后的整张表。
    ///
    /// 用户名无法解析、不是成员或被 Blocked 时返回 `AuthorizationFailed`。
    pub fn update_live_status(
        &self,
        room: &RoomName,
        username: &Username,
        status: LiveStatus,
    ) -> RepositoryResult<LivePresence> {
        let action = "update live status";
        let presence = self.store.update(|tx| {
            let user_id = tx
                .get(Partition::UserNames, username.as_str().as_bytes())?
                .ok_or_else(|| RepositoryError::authorization_failed(action))?;
            let user_id = UserId::parse_str(&decode_text(&user_id)?)
                .map_err(|err| RepositoryError::decoding(err.to_string()))?;
            authorize(tx, room, &user_id, action, MemberRole::can_participate)?;
            store_status(tx, room, username, status)
        })?;
        debug!(room = %room, username = %username, status = ?status, "live status updated");
        Ok(presence)
    }

    /// 连接断开时写入的状态，不检查成员角色。
    ///
    /// 被 Blocked 或移出聊天室的用户连接关闭时也必须能标记为 Offline。
    pub fn clear_live_status(
        &self,
        room: &RoomName,
        username: &Username,
    ) -> RepositoryResult<LivePresence> {
        let presence = self
            .store
            .update(|tx| store_status(tx, room, username, LiveStatus::Offline))?;
        debug!(room = %room, username = %username, "live status cleared");
        Ok(presence)
    }

    /// 没有任何在线记录时返回空表
    pub fn live_presence(&self, room: &RoomName) -> RepositoryResult<LivePresence> {
        self.store.view(|tx| load_presence(tx, room))
    }
}
