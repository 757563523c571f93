use domain::{
    invitation_key, membership_key, Chatroom, MemberRole, RepositoryError, RepositoryResult,
    RoomName, SecretError, UserId,
};
use tracing::{debug, warn};

use super::{authorize, decode, decode_text, encode, role_in, ChatDatabase};
use crate::storage::{KvRead, Partition};

/// 活跃或已停用的聊天室都占用名称
fn room_exists(tx: &impl KvRead, name: &RoomName) -> RepositoryResult<bool> {
    let key = name.as_str().as_bytes();
    Ok(tx.contains(Partition::Chatrooms, key)? || tx.contains(Partition::InactiveChatrooms, key)?)
}

fn load_room(tx: &impl KvRead, partition: Partition, name: &RoomName) -> RepositoryResult<Chatroom> {
    decode(&tx.require(partition, name.as_str())?)
}

fn list_rooms(tx: &impl KvRead, partition: Partition) -> RepositoryResult<Vec<Chatroom>> {
    tx.scan_prefix(partition, b"")?
        .iter()
        .map(|(_, value)| decode(value))
        .collect()
}

impl ChatDatabase {
    /// 创建聊天室并授予创建者 Owner 角色，两者在同一事务中完成
    pub fn create_chatroom(&self, room: &Chatroom) -> RepositoryResult<()> {
        self.store.update(|tx| {
            if room_exists(tx, &room.room_name)? {
                return Err(RepositoryError::duplicate_key(
                    room.room_name.as_str(),
                    Partition::Chatrooms.name(),
                ));
            }
            tx.put(
                Partition::Chatrooms,
                room.room_name.as_str().as_bytes(),
                &encode(room)?,
            )?;
            tx.put(
                Partition::ChatroomMembers,
                membership_key(&room.room_name, &room.owner_id).as_bytes(),
                &[MemberRole::Owner.as_byte()],
            )?;
            Ok(())
        })?;
        debug!(room = %room.room_name, owner_id = %room.owner_id, "chatroom record created");
        Ok(())
    }

    /// Owner 或 Moderator 可以修改公开属性
    pub fn update_chatroom(
        &self,
        actor: &UserId,
        name: &RoomName,
        public: bool,
    ) -> RepositoryResult<Chatroom> {
        self.store.update(|tx| {
            let mut room = load_room(tx, Partition::Chatrooms, name)?;
            authorize(tx, name, actor, "update chatroom", MemberRole::can_moderate)?;

            room.set_visibility(public);
            tx.put(Partition::Chatrooms, name.as_str().as_bytes(), &encode(&room)?)?;
            Ok(room)
        })
    }

    pub fn chatroom(&self, name: &RoomName) -> RepositoryResult<Chatroom> {
        self.store
            .view(|tx| load_room(tx, Partition::Chatrooms, name))
    }

    pub fn inactive_chatroom(&self, name: &RoomName) -> RepositoryResult<Chatroom> {
        self.store
            .view(|tx| load_room(tx, Partition::InactiveChatrooms, name))
    }

    pub fn chatroom_exists(&self, name: &RoomName) -> RepositoryResult<bool> {
        self.store.view(|tx| room_exists(tx, name))
    }

    pub fn public_chatrooms(&self) -> RepositoryResult<Vec<Chatroom>> {
        let rooms = self
            .store
            .view(|tx| list_rooms(tx, Partition::Chatrooms))?;
        Ok(rooms.into_iter().filter(|room| room.public).collect())
    }

    pub fn inactive_chatrooms(&self) -> RepositoryResult<Vec<Chatroom>> {
        self.store
            .view(|tx| list_rooms(tx, Partition::InactiveChatrooms))
    }

    /// 只有 Owner 可以停用；记录从活跃分区移到停用分区
    pub fn deactivate_chatroom(&self, actor: &UserId, name: &RoomName) -> RepositoryResult<()> {
        self.move_chatroom(
            actor,
            name,
            Partition::Chatrooms,
            Partition::InactiveChatrooms,
            "deactivate chatroom",
        )
    }

    /// 停用的逆操作，同样只允许 Owner
    pub fn reactivate_chatroom(&self, actor: &UserId, name: &RoomName) -> RepositoryResult<()> {
        self.move_chatroom(
            actor,
            name,
            Partition::InactiveChatrooms,
            Partition::Chatrooms,
            "reactivate chatroom",
        )
    }

    fn move_chatroom(
        &self,
        actor: &UserId,
        name: &RoomName,
        from: Partition,
        to: Partition,
        action: &str,
    ) -> RepositoryResult<()> {
        self.store.update(|tx| {
            let data = tx.require(from, name.as_str())?;
            authorize(tx, name, actor, action, MemberRole::is_owner)?;

            tx.put(to, name.as_str().as_bytes(), &data)?;
            tx.delete(from, name.as_str().as_bytes())?;
            Ok(())
        })?;
        debug!(room = %name, from = from.name(), to = to.name(), "chatroom moved");
        Ok(())
    }

    /// 加入聊天室
    ///
    /// 私有聊天室需要 `{room_id}-{user_id}` 的邀请，密钥匹配后邀请被删除；
    /// 密钥不匹配时邀请保留。已有成员记录的用户保持原角色。
    pub fn join_chatroom(
        &self,
        name: &RoomName,
        user: &UserId,
        secret: Option<&str>,
    ) -> RepositoryResult<MemberRole> {
        self.store.update(|tx| {
            let room = load_room(tx, Partition::Chatrooms, name)?;
            if let Some(role) = role_in(tx, name, user)? {
                return Ok(role);
            }

            if !room.public {
                let key = invitation_key(&room.room_id, user);
                let digest = decode_text(&tx.require(Partition::Invitations, &key)?)?;
                match self.verifier.verify(&digest, secret.unwrap_or_default()) {
                    Ok(()) => {}
                    Err(SecretError::Mismatch) => {
                        return Err(RepositoryError::security_check_failed("invitation"))
                    }
                    Err(err) => {
                        warn!(room = %name, error = %err, "invitation digest could not be checked");
                        return Err(RepositoryError::security_check_failed("invitation"));
                    }
                }
                tx.delete(Partition::Invitations, key.as_bytes())?;
            }

            tx.put(
                Partition::ChatroomMembers,
                membership_key(name, user).as_bytes(),
                &[MemberRole::Member.as_byte()],
            )?;
            Ok(MemberRole::Member)
        })
    }
}
