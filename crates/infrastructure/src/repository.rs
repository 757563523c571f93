//! 应用层仓储接口的 redb 实现。
//!
//! 存储引擎的调用是同步的，这里统一放到阻塞线程池中执行。

use std::sync::Arc;

use application::{ChatroomRepository, MessageRepository, UserRepository};
use async_trait::async_trait;
use domain::{
    Chatroom, LivePresence, LiveStatus, MemberRole, Message, RepositoryError, RepositoryResult,
    RoomId, RoomMember, RoomName, Timestamp, User, UserId, UserToken, Username,
};
use tracing::{debug, warn};

use crate::db::ChatDatabase;

#[derive(Clone)]
pub struct RedbRepository {
    db: Arc<ChatDatabase>,
}

impl RedbRepository {
    pub fn new(db: Arc<ChatDatabase>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &ChatDatabase {
        &self.db
    }

    async fn blocking<T, F>(&self, operation: &'static str, op: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ChatDatabase) -> RepositoryResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|err| RepositoryError::storage(format!("storage task failed: {err}")))?;

        match &result {
            Err(err @ RepositoryError::Storage(_))
            | Err(err @ RepositoryError::PartitionNotFound { .. })
            | Err(err @ RepositoryError::Encoding(_))
            | Err(err @ RepositoryError::Decoding(_)) => {
                warn!(operation, error = %err, "storage operation failed");
            }
            Err(err) => debug!(operation, error = %err, "storage operation rejected"),
            Ok(_) => {}
        }
        result
    }
}

#[async_trait]
impl UserRepository for RedbRepository {
    async fn create(&self, user: User, token: Option<UserToken>) -> Result<(), RepositoryError> {
        self.blocking("signup", move |db| db.signup(&user, token.as_ref()))
            .await
    }

    async fn find_by_id(&self, id: UserId) -> Result<User, RepositoryError> {
        self.blocking("user_by_id", move |db| db.user_by_id(&id)).await
    }

    async fn find_by_username(&self, username: &Username) -> Result<User, RepositoryError> {
        let username = username.clone();
        self.blocking("user_by_username", move |db| db.user_by_username(&username))
            .await
    }

    async fn find_deactivated_by_username(
        &self,
        username: &Username,
    ) -> Result<User, RepositoryError> {
        let username = username.clone();
        self.blocking("deactivated_user_by_username", move |db| {
            db.deactivated_user_by_username(&username)
        })
        .await
    }

    async fn deactivate(&self, id: UserId) -> Result<(), RepositoryError> {
        self.blocking("deactivate_user", move |db| db.deactivate_user(&id))
            .await
    }

    async fn reactivate(&self, id: UserId) -> Result<User, RepositoryError> {
        self.blocking("reactivate_user", move |db| db.reactivate_user(&id))
            .await
    }

    async fn set_online(&self, username: &Username, online: bool) -> Result<(), RepositoryError> {
        let username = username.clone();
        self.blocking("set_online", move |db| db.set_online(&username, online))
            .await
    }

    async fn is_online(&self, username: &Username) -> Result<bool, RepositoryError> {
        let username = username.clone();
        self.blocking("is_online", move |db| db.is_online(&username))
            .await
    }

    async fn save_token(&self, id: UserId, token: UserToken) -> Result<(), RepositoryError> {
        self.blocking("save_token", move |db| db.save_token(&id, &token))
            .await
    }

    async fn find_token(&self, id: UserId) -> Result<UserToken, RepositoryError> {
        self.blocking("user_token", move |db| db.user_token(&id)).await
    }

    async fn clear_token(&self, id: UserId) -> Result<(), RepositoryError> {
        self.blocking("clear_token", move |db| db.clear_token(&id)).await
    }
}

#[async_trait]
impl ChatroomRepository for RedbRepository {
    async fn create(&self, room: Chatroom) -> Result<(), RepositoryError> {
        self.blocking("create_chatroom", move |db| db.create_chatroom(&room))
            .await
    }

    async fn update_visibility(
        &self,
        actor: UserId,
        name: &RoomName,
        public: bool,
    ) -> Result<Chatroom, RepositoryError> {
        let name = name.clone();
        self.blocking("update_chatroom", move |db| {
            db.update_chatroom(&actor, &name, public)
        })
        .await
    }

    async fn find(&self, name: &RoomName) -> Result<Chatroom, RepositoryError> {
        let name = name.clone();
        self.blocking("chatroom", move |db| db.chatroom(&name)).await
    }

    async fn list_public(&self) -> Result<Vec<Chatroom>, RepositoryError> {
        self.blocking("public_chatrooms", |db| db.public_chatrooms())
            .await
    }

    async fn list_inactive(&self) -> Result<Vec<Chatroom>, RepositoryError> {
        self.blocking("inactive_chatrooms", |db| db.inactive_chatrooms())
            .await
    }

    async fn deactivate(&self, actor: UserId, name: &RoomName) -> Result<(), RepositoryError> {
        let name = name.clone();
        self.blocking("deactivate_chatroom", move |db| {
            db.deactivate_chatroom(&actor, &name)
        })
        .await
    }

    async fn reactivate(&self, actor: UserId, name: &RoomName) -> Result<(), RepositoryError> {
        let name = name.clone();
        self.blocking("reactivate_chatroom", move |db| {
            db.reactivate_chatroom(&actor, &name)
        })
        .await
    }

    async fn join(
        &self,
        name: &RoomName,
        user: UserId,
        secret: Option<String>,
    ) -> Result<MemberRole, RepositoryError> {
        let name = name.clone();
        self.blocking("join_chatroom", move |db| {
            db.join_chatroom(&name, &user, secret.as_deref())
        })
        .await
    }

    async fn role_of(&self, name: &RoomName, user: UserId) -> Result<MemberRole, RepositoryError> {
        let name = name.clone();
        self.blocking("member_role", move |db| db.member_role(&name, &user))
            .await
    }

    async fn save_member(
        &self,
        name: &RoomName,
        user: UserId,
        role: MemberRole,
    ) -> Result<(), RepositoryError> {
        let name = name.clone();
        self.blocking("save_member", move |db| db.save_member(&name, &user, role))
            .await
    }

    async fn assign_role(
        &self,
        actor: UserId,
        name: &RoomName,
        target: UserId,
        role: MemberRole,
    ) -> Result<(), RepositoryError> {
        let name = name.clone();
        self.blocking("assign_role", move |db| {
            db.assign_role(&actor, &name, &target, role)
        })
        .await
    }

    async fn members(&self, name: &RoomName) -> Result<Vec<RoomMember>, RepositoryError> {
        let name = name.clone();
        self.blocking("room_members", move |db| db.room_members(&name))
            .await
    }

    async fn remove_member(
        &self,
        actor: UserId,
        name: &RoomName,
        target: UserId,
    ) -> Result<(), RepositoryError> {
        let name = name.clone();
        self.blocking("remove_member", move |db| {
            db.remove_member(&actor, &name, &target)
        })
        .await
    }

    async fn store_invitation(
        &self,
        room_id: RoomId,
        user: UserId,
        digest: String,
    ) -> Result<(), RepositoryError> {
        self.blocking("store_invitation", move |db| {
            db.store_invitation(&room_id, &user, &digest)
        })
        .await
    }

    async fn issue_invitation(
        &self,
        actor: UserId,
        name: &RoomName,
        invitee: &Username,
        digest: String,
    ) -> Result<(), RepositoryError> {
        let name = name.clone();
        let invitee = invitee.clone();
        self.blocking("issue_invitation", move |db| {
            db.issue_invitation(&actor, &name, &invitee, &digest)
        })
        .await
    }

    async fn consume_invitation(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<(), RepositoryError> {
        self.blocking("consume_invitation", move |db| {
            db.consume_invitation(&room_id, &user)
        })
        .await
    }

    async fn update_live_status(
        &self,
        name: &RoomName,
        username: &Username,
        status: LiveStatus,
    ) -> Result<LivePresence, RepositoryError> {
        let name = name.clone();
        let username = username.clone();
        self.blocking("update_live_status", move |db| {
            db.update_live_status(&name, &username, status)
        })
        .await
    }

    async fn clear_live_status(
        &self,
        name: &RoomName,
        username: &Username,
    ) -> Result<LivePresence, RepositoryError> {
        let name = name.clone();
        let username = username.clone();
        self.blocking("clear_live_status", move |db| {
            db.clear_live_status(&name, &username)
        })
        .await
    }

    async fn live_presence(&self, name: &RoomName) -> Result<LivePresence, RepositoryError> {
        let name = name.clone();
        self.blocking("live_presence", move |db| db.live_presence(&name))
            .await
    }
}

#[async_trait]
impl MessageRepository for RedbRepository {
    async fn save(&self, room: &RoomName, message: Message) -> Result<(), RepositoryError> {
        let room = room.clone();
        self.blocking("save_message", move |db| db.save_message(&room, &message))
            .await
    }

    async fn paginate(
        &self,
        room: &RoomName,
        page: i64,
        limit: i64,
        now: Timestamp,
    ) -> Result<Vec<u8>, RepositoryError> {
        let room = room.clone();
        self.blocking("paginate_messages", move |db| {
            db.paginate_messages(&room, page, limit, now)
        })
        .await
    }
}
