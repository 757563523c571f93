mod chat_service;
mod user_service;


pub use chat_service::{
    ChatService, ChatServiceDependencies, CreateRoomRequest, HistoryRequest, InviteMemberRequest,
    LiveSession,
};
pub use user_service::{
    AuthSession, SigninRequest, SignupRequest, UserService, UserServiceDependencies,
};
