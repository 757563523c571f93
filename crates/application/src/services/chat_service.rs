use std::sync::Arc;

use domain::{
    normalize_inbound, Chatroom, DomainError, LiveEvent, LivePresence, LiveStatus, MemberRole,
    Message, MessageContent, RepositoryError, RoomMember, RoomName, SecretVerifier, StatusNotice,
    UserId, Username,
};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::ApplicationError,
    hub::{ClientId, Frame, HubHandle, HubRegistry},
    repository::{ChatroomRepository, MessageRepository, UserRepository},
    secret::hash_secret,
};

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub name: String,
    pub public: bool,
}

#[derive(Debug, Clone)]
pub struct InviteMemberRequest {
    pub room: String,
    pub inviter_id: UserId, // 邀请人（从JWT获取）
    pub invitee: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub room: String,
    pub user_id: UserId,
    pub page: i64,
    pub limit: i64,
}

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn ChatroomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub secret_verifier: Arc<dyn SecretVerifier>,
    pub clock: Arc<dyn Clock>,
    pub hubs: Arc<HubRegistry>,
}

/// 一条已经接入广播中心的实时连接
pub struct LiveSession {
    pub room: RoomName,
    pub user_id: UserId,
    pub username: Username,
    pub client_id: ClientId,
    pub hub: HubHandle,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    // 非 Blocked 成员才能进行聊天室内操作，没有成员记录视为无权限
    async fn require_participant(
        &self,
        room: &RoomName,
        user_id: UserId,
        action: &str,
    ) -> Result<MemberRole, ApplicationError> {
        match self.deps.room_repository.role_of(room, user_id).await {
            Ok(role) if role.can_participate() => Ok(role),
            Ok(_) => Err(ApplicationError::forbidden(action)),
            Err(RepositoryError::RecordNotFound { .. }) => Err(ApplicationError::forbidden(action)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_room(
        &self,
        owner_id: UserId,
        request: CreateRoomRequest,
    ) -> Result<Chatroom, ApplicationError> {
        let name = RoomName::parse(request.name)?;
        let room = Chatroom::new(name, owner_id, request.public);
        self.deps.room_repository.create(room.clone()).await?;
        info!(room = %room.room_name, owner_id = %owner_id, "chatroom created");
        Ok(room)
    }

    pub async fn update_room(
        &self,
        operator_id: UserId,
        room: &str,
        public: bool,
    ) -> Result<Chatroom, ApplicationError> {
        let name = RoomName::parse(room)?;
        let updated = self
            .deps
            .room_repository
            .update_visibility(operator_id, &name, public)
            .await?;
        info!(room = %name, public, "chatroom updated");
        Ok(updated)
    }

    pub async fn get_room(&self, room: &str) -> Result<Chatroom, ApplicationError> {
        let name = RoomName::parse(room)?;
        Ok(self.deps.room_repository.find(&name).await?)
    }

    pub async fn list_public_rooms(&self) -> Result<Vec<Chatroom>, ApplicationError> {
        Ok(self.deps.room_repository.list_public().await?)
    }

    pub async fn list_inactive_rooms(&self) -> Result<Vec<Chatroom>, ApplicationError> {
        Ok(self.deps.room_repository.list_inactive().await?)
    }

    /// 只有 Owner 可以停用，停用后关闭该聊天室的广播中心并断开仍在线的连接
    pub async fn deactivate_room(
        &self,
        operator_id: UserId,
        room: &str,
    ) -> Result<(), ApplicationError> {
        let name = RoomName::parse(room)?;
        self.deps
            .room_repository
            .deactivate(operator_id, &name)
            .await?;
        self.deps.hubs.close(&name).await;
        info!(room = %name, "chatroom deactivated");
        Ok(())
    }

    pub async fn reactivate_room(
        &self,
        operator_id: UserId,
        room: &str,
    ) -> Result<(), ApplicationError> {
        let name = RoomName::parse(room)?;
        self.deps
            .room_repository
            .reactivate(operator_id, &name)
            .await?;
        info!(room = %name, "chatroom reactivated");
        Ok(())
    }

    /// 邀请密钥在存储前加盐哈希
    pub async fn invite_member(&self, request: InviteMemberRequest) -> Result<(), ApplicationError> {
        let name = RoomName::parse(request.room)?;
        let invitee = Username::parse(request.invitee)?;
        if request.secret.is_empty() {
            return Err(DomainError::invalid_argument("secret", "cannot be empty").into());
        }

        let digest = hash_secret(Arc::clone(&self.deps.secret_verifier), request.secret).await?;
        self.deps
            .room_repository
            .issue_invitation(request.inviter_id, &name, &invitee, digest)
            .await?;
        info!(room = %name, invitee = %invitee, "invitation issued");
        Ok(())
    }

    pub async fn join_room(
        &self,
        user_id: UserId,
        room: &str,
        secret: Option<String>,
    ) -> Result<MemberRole, ApplicationError> {
        let name = RoomName::parse(room)?;
        let role = self
            .deps
            .room_repository
            .join(&name, user_id, secret)
            .await?;
        info!(room = %name, user_id = %user_id, role = %role, "user joined chatroom");
        Ok(role)
    }

    pub async fn member_role(
        &self,
        room: &str,
        user_id: UserId,
    ) -> Result<MemberRole, ApplicationError> {
        let name = RoomName::parse(room)?;
        Ok(self.deps.room_repository.role_of(&name, user_id).await?)
    }

    /// 公开聊天室的成员列表对所有登录用户可见，私有聊天室需要成员身份
    pub async fn list_members(
        &self,
        user_id: UserId,
        room: &str,
    ) -> Result<Vec<RoomMember>, ApplicationError> {
        let name = RoomName::parse(room)?;
        let chatroom = self.deps.room_repository.find(&name).await?;
        if !chatroom.public {
            self.require_participant(&name, user_id, "list members")
                .await?;
        }
        Ok(self.deps.room_repository.members(&name).await?)
    }

    pub async fn change_member_role(
        &self,
        operator_id: UserId,
        room: &str,
        target: UserId,
        role: MemberRole,
    ) -> Result<(), ApplicationError> {
        let name = RoomName::parse(room)?;
        self.deps
            .room_repository
            .assign_role(operator_id, &name, target, role)
            .await?;
        info!(room = %name, target = %target, role = %role, "member role changed");
        Ok(())
    }

    pub async fn remove_member(
        &self,
        operator_id: UserId,
        room: &str,
        target: UserId,
    ) -> Result<(), ApplicationError> {
        let name = RoomName::parse(room)?;
        self.deps
            .room_repository
            .remove_member(operator_id, &name, target)
            .await?;
        info!(room = %name, target = %target, "member removed");
        Ok(())
    }

    /// 先持久化再广播给在线连接
    pub async fn send_message(
        &self,
        sender_id: UserId,
        room: &str,
        content: &str,
    ) -> Result<Message, ApplicationError> {
        let name = RoomName::parse(room)?;
        self.post_message(&name, sender_id, content).await
    }

    async fn post_message(
        &self,
        room: &RoomName,
        sender_id: UserId,
        content: &str,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::parse(content)?;
        self.require_participant(room, sender_id, "send message")
            .await?;

        let message = Message::new(sender_id, content, self.deps.clock.now());
        self.deps
            .message_repository
            .save(room, message.clone())
            .await?;

        self.publish(room, LiveEvent::UserMessage(message.clone()))
            .await;
        Ok(message)
    }

    /// 返回原始记录拼接成的 JSON 数组
    pub async fn message_history(&self, request: HistoryRequest) -> Result<Vec<u8>, ApplicationError> {
        let name = RoomName::parse(request.room)?;
        let chatroom = self.deps.room_repository.find(&name).await?;
        if !chatroom.public {
            self.require_participant(&name, request.user_id, "read history")
                .await?;
        }
        let now = self.deps.clock.now();
        Ok(self
            .deps
            .message_repository
            .paginate(&name, request.page, request.limit, now)
            .await?)
    }

    pub async fn update_status(
        &self,
        user_id: UserId,
        room: &str,
        status: LiveStatus,
    ) -> Result<LivePresence, ApplicationError> {
        let name = RoomName::parse(room)?;
        let user = self.deps.user_repository.find_by_id(user_id).await?;
        self.apply_status(&name, &user.user_name, status).await
    }

    pub async fn live_presence(&self, room: &str) -> Result<LivePresence, ApplicationError> {
        let name = RoomName::parse(room)?;
        Ok(self.deps.room_repository.live_presence(&name).await?)
    }

    async fn apply_status(
        &self,
        room: &RoomName,
        username: &Username,
        status: LiveStatus,
    ) -> Result<LivePresence, ApplicationError> {
        let presence = self
            .deps
            .room_repository
            .update_live_status(room, username, status)
            .await?;
        self.announce(room, username, status).await;
        Ok(presence)
    }

    async fn announce(&self, room: &RoomName, username: &Username, status: LiveStatus) {
        self.publish(
            room,
            LiveEvent::ApiStatus(StatusNotice {
                username: username.to_string(),
                status,
            }),
        )
        .await;
    }

    // 广播失败只记录日志，不影响已经完成的写入
    async fn publish(&self, room: &RoomName, event: LiveEvent) {
        let Some(hub) = self.deps.hubs.get(room).await else {
            return;
        };
        match event.to_frame() {
            Ok(frame) => {
                if let Err(err) = hub.broadcast(Frame::from(frame)).await {
                    warn!(room = %room, error = %err, "failed to broadcast event");
                }
            }
            Err(err) => warn!(room = %room, error = %err, "failed to encode live event"),
        }
    }

    /// 升级连接之前的检查：聊天室处于活跃状态且用户不是 Blocked
    pub async fn check_live_access(&self, user_id: UserId, room: &str) -> Result<(), ApplicationError> {
        let name = RoomName::parse(room)?;
        self.require_live_access(&name, user_id).await
    }

    async fn require_live_access(&self, room: &RoomName, user_id: UserId) -> Result<(), ApplicationError> {
        self.deps.room_repository.find(room).await?;
        self.require_participant(room, user_id, "connect").await?;
        Ok(())
    }

    /// 建立实时连接：校验成员身份，注册到广播中心，并把用户标记为 Online
    pub async fn connect(
        &self,
        user_id: UserId,
        room: &str,
    ) -> Result<(LiveSession, tokio::sync::mpsc::Receiver<Frame>), ApplicationError> {
        let name = RoomName::parse(room)?;
        self.require_live_access(&name, user_id).await?;
        let user = self.deps.user_repository.find_by_id(user_id).await?;

        let hub = self.deps.hubs.acquire(&name).await;
        let subscription = match hub.register().await {
            Ok(subscription) => subscription,
            Err(err) => {
                self.deps.hubs.release(&hub).await;
                return Err(err.into());
            }
        };

        let session = LiveSession {
            room: name,
            user_id,
            username: user.user_name,
            client_id: subscription.id,
            hub,
        };

        if let Err(err) = self
            .apply_status(&session.room, &session.username, LiveStatus::Online)
            .await
        {
            warn!(room = %session.room, user_id = %user_id, error = %err, "failed to record presence");
        }
        info!(room = %session.room, user_id = %user_id, client = session.client_id, "live connection opened");
        Ok((session, subscription.receiver))
    }

    /// 处理连接上收到的一条文本，规范化后为空的消息直接忽略
    pub async fn receive(
        &self,
        session: &LiveSession,
        raw: &str,
    ) -> Result<Option<Message>, ApplicationError> {
        let text = normalize_inbound(raw);
        if text.is_empty() {
            debug!(room = %session.room, "ignoring empty inbound message");
            return Ok(None);
        }
        self.post_message(&session.room, session.user_id, &text)
            .await
            .map(Some)
    }

    /// 连接断开：从广播中心注销并把用户标记为 Offline。
    ///
    /// 不检查成员角色，被 Blocked 或移出聊天室的连接同样会清理在线状态。
    pub async fn disconnect(&self, session: LiveSession) {
        if let Err(err) = session.hub.unregister(session.client_id).await {
            debug!(room = %session.room, error = %err, "hub already closed");
        }
        self.deps.hubs.release(&session.hub).await;

        match self
            .deps
            .room_repository
            .clear_live_status(&session.room, &session.username)
            .await
        {
            Ok(_) => {
                self.announce(&session.room, &session.username, LiveStatus::Offline)
                    .await
            }
            Err(err) => {
                warn!(room = %session.room, user_id = %session.user_id, error = %err, "failed to record presence")
            }
        }
        info!(room = %session.room, user_id = %session.user_id, client = session.client_id, "live connection closed");
    }
}
