//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验和授权，
//! 以及对外部适配器（例如访问令牌、密钥哈希、实时广播）的抽象。

pub mod clock;
pub mod credential;
pub mod error;
pub mod hub;
pub mod repository;
pub mod secret;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use credential::{CredentialError, CredentialService};
pub use error::ApplicationError;
pub use hub::{ClientId, ClientSubscription, Frame, HubError, HubHandle, HubRegistry};
pub use repository::{ChatroomRepository, MessageRepository, UserRepository};
pub use services::{
    AuthSession, ChatService, ChatServiceDependencies, CreateRoomRequest, HistoryRequest,
    InviteMemberRequest, LiveSession, SigninRequest, SignupRequest, UserService,
    UserServiceDependencies,
};
