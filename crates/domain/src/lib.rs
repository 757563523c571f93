//! 聊天室系统核心领域模型
//!
//! 包含用户、聊天室、成员角色、消息和实时状态等实体，以及错误分类和密钥校验能力。

pub mod chat_room;
pub mod errors;
pub mod message;
pub mod presence;
pub mod room_member;
pub mod secret_verifier;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use chat_room::*;
pub use errors::*;
pub use message::*;
pub use presence::*;
pub use room_member::*;
pub use secret_verifier::*;
pub use user::*;
pub use value_objects::*;
