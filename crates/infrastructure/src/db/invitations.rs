use domain::{
    invitation_key, MemberRole, RepositoryError, RepositoryResult, RoomId, RoomName, UserId,
    Username,
};
use tracing::debug;

use super::{authorize, decode, decode_text, ChatDatabase};
use crate::storage::{KvRead, Partition};

impl ChatDatabase {
    /// 写入（或覆盖）邀请，`digest` 是已经加盐哈希的密钥
    pub fn store_invitation(
        &self,
        room_id: &RoomId,
        user: &UserId,
        digest: &str,
    ) -> RepositoryResult<()> {
        let key = invitation_key(room_id, user);
        self.store
            .update(|tx| tx.put(Partition::Invitations, key.as_bytes(), digest.as_bytes()))
    }

    /// 删除邀请，不存在时返回 `RecordNotFound`
    pub fn consume_invitation(&self, room_id: &RoomId, user: &UserId) -> RepositoryResult<()> {
        let key = invitation_key(room_id, user);
        self.store.update(|tx| {
            if tx.delete(Partition::Invitations, key.as_bytes())? {
                Ok(())
            } else {
                Err(RepositoryError::record_not_found(
                    key.as_str(),
                    Partition::Invitations.name(),
                ))
            }
        })
    }

    pub fn invitation_exists(&self, room_id: &RoomId, user: &UserId) -> RepositoryResult<bool> {
        let key = invitation_key(room_id, user);
        self.store
            .view(|tx| tx.contains(Partition::Invitations, key.as_bytes()))
    }

    /// Owner 或 Moderator 为某个用户名发出邀请
    pub fn issue_invitation(
        &self,
        actor: &UserId,
        room: &RoomName,
        invitee: &Username,
        digest: &str,
    ) -> RepositoryResult<()> {
        self.store.update(|tx| {
            let chatroom: domain::Chatroom = decode(&tx.require(Partition::Chatrooms, room.as_str())?)?;
            authorize(tx, room, actor, "invite member", MemberRole::can_moderate)?;

            let invitee_id = decode_text(&tx.require(Partition::UserNames, invitee.as_str())?)?;
            let invitee_id = UserId::parse_str(&invitee_id)
                .map_err(|err| RepositoryError::decoding(err.to_string()))?;

            let key = invitation_key(&chatroom.room_id, &invitee_id);
            tx.put(Partition::Invitations, key.as_bytes(), digest.as_bytes())
        })?;
        debug!(room = %room, invitee = %invitee, "invitation stored");
        Ok(())
    }
}
