use async_trait::async_trait;
use domain::{
    Chatroom, LivePresence, LiveStatus, MemberRole, Message, RepositoryError, RoomId, RoomMember,
    RoomName, Timestamp, User, UserId, UserToken, Username,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 在一个事务中写入用户、用户名索引、在线标志和可选的令牌
    async fn create(&self, user: User, token: Option<UserToken>) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<User, RepositoryError>;
    async fn find_by_username(&self, username: &Username) -> Result<User, RepositoryError>;
    async fn find_deactivated_by_username(
        &self,
        username: &Username,
    ) -> Result<User, RepositoryError>;
    async fn deactivate(&self, id: UserId) -> Result<(), RepositoryError>;
    async fn reactivate(&self, id: UserId) -> Result<User, RepositoryError>;
    async fn set_online(&self, username: &Username, online: bool) -> Result<(), RepositoryError>;
    async fn is_online(&self, username: &Username) -> Result<bool, RepositoryError>;
    async fn save_token(&self, id: UserId, token: UserToken) -> Result<(), RepositoryError>;
    async fn find_token(&self, id: UserId) -> Result<UserToken, RepositoryError>;
    async fn clear_token(&self, id: UserId) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatroomRepository: Send + Sync {
    /// 创建聊天室并授予创建者 Owner 角色
    async fn create(&self, room: Chatroom) -> Result<(), RepositoryError>;
    async fn update_visibility(
        &self,
        actor: UserId,
        name: &RoomName,
        public: bool,
    ) -> Result<Chatroom, RepositoryError>;
    async fn find(&self, name: &RoomName) -> Result<Chatroom, RepositoryError>;
    async fn list_public(&self) -> Result<Vec<Chatroom>, RepositoryError>;
    async fn list_inactive(&self) -> Result<Vec<Chatroom>, RepositoryError>;
    async fn deactivate(&self, actor: UserId, name: &RoomName) -> Result<(), RepositoryError>;
    async fn reactivate(&self, actor: UserId, name: &RoomName) -> Result<(), RepositoryError>;
    /// 私有聊天室需要提供邀请密钥，成功后邀请被消费
    async fn join(
        &self,
        name: &RoomName,
        user: UserId,
        secret: Option<String>,
    ) -> Result<MemberRole, RepositoryError>;

    async fn role_of(&self, name: &RoomName, user: UserId) -> Result<MemberRole, RepositoryError>;
    async fn save_member(
        &self,
        name: &RoomName,
        user: UserId,
        role: MemberRole,
    ) -> Result<(), RepositoryError>;
    async fn assign_role(
        &self,
        actor: UserId,
        name: &RoomName,
        target: UserId,
        role: MemberRole,
    ) -> Result<(), RepositoryError>;
    async fn members(&self, name: &RoomName) -> Result<Vec<RoomMember>, RepositoryError>;
    async fn remove_member(
        &self,
        actor: UserId,
        name: &RoomName,
        target: UserId,
    ) -> Result<(), RepositoryError>;

    async fn store_invitation(
        &self,
        room_id: RoomId,
        user: UserId,
        digest: String,
    ) -> Result<(), RepositoryError>;
    async fn issue_invitation(
        &self,
        actor: UserId,
        name: &RoomName,
        invitee: &Username,
        digest: String,
    ) -> Result<(), RepositoryError>;
    async fn consume_invitation(&self, room_id: RoomId, user: UserId)
        -> Result<(), RepositoryError>;

    async fn update_live_status(
        &self,
        name: &RoomName,
        username: &Username,
        status: LiveStatus,
    ) -> Result<LivePresence, RepositoryError>;
    /// 连接断开时标记 Offline，不检查成员角色
    async fn clear_live_status(
        &self,
        name: &RoomName,
        username: &Username,
    ) -> Result<LivePresence, RepositoryError>;
    async fn live_presence(&self, name: &RoomName) -> Result<LivePresence, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 聊天室不存在时拒绝写入
    async fn save(&self, room: &RoomName, message: Message) -> Result<(), RepositoryError>;

    /// 按天分页，返回原始记录拼接成的 JSON 数组字节
    async fn paginate(
        &self,
        room: &RoomName,
        page: i64,
        limit: i64,
        now: Timestamp,
    ) -> Result<Vec<u8>, RepositoryError>;
}
