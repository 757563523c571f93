use domain::{
    membership_key, membership_prefix, MemberRole, RepositoryError, RepositoryResult, RoomMember,
    RoomName, UserId,
};
use tracing::debug;

use super::{authorize, decode_role, decode_text, role_in, ChatDatabase};
use crate::storage::{KvRead, Partition, WriteTx};

fn require_active_room(tx: &WriteTx, room: &RoomName) -> RepositoryResult<()> {
    tx.require(Partition::Chatrooms, room.as_str()).map(|_| ())
}

impl ChatDatabase {
    pub fn member_role(&self, room: &RoomName, user: &UserId) -> RepositoryResult<MemberRole> {
        let key = membership_key(room, user);
        self.store
            .view(|tx| decode_role(&tx.require(Partition::ChatroomMembers, &key)?))
    }

    /// 直接写入成员角色，不校验角色之间的转换
    pub fn save_member(
        &self,
        room: &RoomName,
        user: &UserId,
        role: MemberRole,
    ) -> RepositoryResult<()> {
        self.store.update(|tx| {
            require_active_room(tx, room)?;
            tx.put(
                Partition::ChatroomMembers,
                membership_key(room, user).as_bytes(),
                &[role.as_byte()],
            )
        })
    }

    /// 由 Owner 或 Moderator 调整其他用户的角色。
    ///
    /// Owner 的角色和 Owner 角色的授予只能由 Owner 操作。
    pub fn assign_role(
        &self,
        actor: &UserId,
        room: &RoomName,
        target: &UserId,
        role: MemberRole,
    ) -> RepositoryResult<()> {
        self.store.update(|tx| {
            require_active_room(tx, room)?;
            let actor_role = authorize(tx, room, actor, "change member role", MemberRole::can_moderate)?;
            tx.require(Partition::Users, &target.to_string())?;

            let target_is_owner = role_in(tx, room, target)? == Some(MemberRole::Owner);
            if !actor_role.is_owner() && (target_is_owner || role == MemberRole::Owner) {
                return Err(RepositoryError::authorization_failed("change owner role"));
            }

            tx.put(
                Partition::ChatroomMembers,
                membership_key(room, target).as_bytes(),
                &[role.as_byte()],
            )
        })?;
        debug!(room = %room, target = %target, role = %role, "member role stored");
        Ok(())
    }

    /// `{room}-` 前缀下的全部成员
    pub fn room_members(&self, room: &RoomName) -> RepositoryResult<Vec<RoomMember>> {
        let prefix = membership_prefix(room);
        let entries = self
            .store
            .view(|tx| tx.scan_prefix(Partition::ChatroomMembers, prefix.as_bytes()))?;

        entries
            .into_iter()
            .map(|(key, value)| {
                let key = decode_text(&key)?;
                let user_id = UserId::parse_str(&key[prefix.len()..])
                    .map_err(|err| RepositoryError::decoding(err.to_string()))?;
                Ok(RoomMember {
                    user_id,
                    role: decode_role(&value)?,
                })
            })
            .collect()
    }

    /// 成员自己退出，或由 Owner / Moderator 移除；Moderator 不能移除 Owner
    pub fn remove_member(
        &self,
        actor: &UserId,
        room: &RoomName,
        target: &UserId,
    ) -> RepositoryResult<()> {
        self.store.update(|tx| {
            let key = membership_key(room, target);
            let target_role = match tx.get(Partition::ChatroomMembers, key.as_bytes())? {
                Some(bytes) => decode_role(&bytes)?,
                None => {
                    return Err(RepositoryError::record_not_found(
                        key,
                        Partition::ChatroomMembers.name(),
                    ))
                }
            };

            if actor != target {
                let actor_role =
                    authorize(tx, room, actor, "remove member", MemberRole::can_moderate)?;
                if target_role.is_owner() && !actor_role.is_owner() {
                    return Err(RepositoryError::authorization_failed("remove owner"));
                }
            }

            tx.delete(Partition::ChatroomMembers, key.as_bytes())?;
            Ok(())
        })?;
        debug!(room = %room, target = %target, "member removed");
        Ok(())
    }

    /// 无权限校验的删除
    pub fn delete_member(&self, room: &RoomName, user: &UserId) -> RepositoryResult<()> {
        let key = membership_key(room, user);
        self.store.update(|tx| {
            if tx.delete(Partition::ChatroomMembers, key.as_bytes())? {
                Ok(())
            } else {
                Err(RepositoryError::record_not_found(
                    key.as_str(),
                    Partition::ChatroomMembers.name(),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use domain::{MemberRole, RepositoryError, RoomName, UserId};

    use crate::db::test_support::{create_room, database, signup};

    #[test]
    fn roles_move_freely_between_all_values() {
        let db = database();
        let alice = signup(&db, "alice");
        let bob = signup(&db, "bob");
        let room = create_room(&db, &alice, "generalchat42", true);

        for role in [
            MemberRole::Blocked,
            MemberRole::Moderator,
            MemberRole::Member,
            MemberRole::Blocked,
        ] {
            db.save_member(&room.room_name, &bob.user_id, role).unwrap();
            assert_eq!(db.member_role(&room.room_name, &bob.user_id).unwrap(), role);
        }
    }

    #[test]
    fn saving_member_of_unknown_room_fails() {
        let db = database();
        let bob = signup(&db, "bob");
        let room = RoomName::parse("nowhere1").unwrap();
        let err = db
            .save_member(&room, &bob.user_id, MemberRole::Member)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn members_listing_is_scoped_to_room() {
        let db = database();
        let alice = signup(&db, "alice");
        let bob = signup(&db, "bob");
        let first = create_room(&db, &alice, "generalchat42", true);
        let second = create_room(&db, &bob, "generalchat4", true);
        db.save_member(&first.room_name, &bob.user_id, MemberRole::Member)
            .unwrap();

        let mut members = db.room_members(&first.room_name).unwrap();
        members.sort_by_key(|m| m.role);
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].user_id, alice.user_id);
        assert_eq!(members[1].role, MemberRole::Owner);
        assert_eq!(members[0].user_id, bob.user_id);

        let members = db.room_members(&second.room_name).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, bob.user_id);
    }

    #[test]
    fn moderator_cannot_touch_owner() {
        let db = database();
        let alice = signup(&db, "alice");
        let bob = signup(&db, "bob");
        let carol = signup(&db, "carol");
        let room = create_room(&db, &alice, "generalchat42", true);
        db.save_member(&room.room_name, &bob.user_id, MemberRole::Moderator)
            .unwrap();

        let err = db
            .assign_role(&bob.user_id, &room.room_name, &alice.user_id, MemberRole::Member)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AuthorizationFailed { .. }));

        let err = db
            .assign_role(&bob.user_id, &room.room_name, &carol.user_id, MemberRole::Owner)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AuthorizationFailed { .. }));

        db.assign_role(&bob.user_id, &room.room_name, &carol.user_id, MemberRole::Blocked)
            .unwrap();
        assert_eq!(
            db.member_role(&room.room_name, &carol.user_id).unwrap(),
            MemberRole::Blocked
        );

        let err = db
            .remove_member(&bob.user_id, &room.room_name, &alice.user_id)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AuthorizationFailed { .. }));
    }

    #[test]
    fn member_cannot_assign_roles() {
        let db = database();
        let alice = signup(&db, "alice");
        let bob = signup(&db, "bob");
        let room = create_room(&db, &alice, "generalchat42", true);
        db.save_member(&room.room_name, &bob.user_id, MemberRole::Member)
            .unwrap();

        let err = db
            .assign_role(&bob.user_id, &room.room_name, &bob.user_id, MemberRole::Moderator)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AuthorizationFailed { .. }));
        assert_eq!(
            db.member_role(&room.room_name, &bob.user_id).unwrap(),
            MemberRole::Member
        );
    }

    #[test]
    fn roles_are_only_assigned_to_existing_users() {
        let db = database();
        let alice = signup(&db, "alice");
        let room = create_room(&db, &alice, "generalchat42", true);
        let stranger = UserId::generate();

        let err = db
            .assign_role(&alice.user_id, &room.room_name, &stranger, MemberRole::Member)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(db.member_role(&room.room_name, &stranger).unwrap_err().is_not_found());
        assert_eq!(db.room_members(&room.room_name).unwrap().len(), 1);
    }

    #[test]
    fn members_may_leave_and_be_removed() {
        let db = database();
        let alice = signup(&db, "alice");
        let bob = signup(&db, "bob");
        let carol = signup(&db, "carol");
        let room = create_room(&db, &alice, "generalchat42", true);
        db.save_member(&room.room_name, &bob.user_id, MemberRole::Member)
            .unwrap();
        db.save_member(&room.room_name, &carol.user_id, MemberRole::Member)
            .unwrap();

        let err = db
            .remove_member(&bob.user_id, &room.room_name, &carol.user_id)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AuthorizationFailed { .. }));

        db.remove_member(&bob.user_id, &room.room_name, &bob.user_id)
            .unwrap();
        db.remove_member(&alice.user_id, &room.room_name, &carol.user_id)
            .unwrap();
        assert_eq!(db.room_members(&room.room_name).unwrap().len(), 1);

        let err = db
            .remove_member(&alice.user_id, &room.room_name, &UserId::generate())
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
