use serde::{Deserialize, Serialize};

use crate::value_objects::{RoomId, RoomName, UserId};

/// 聊天室实体，以 `room_name` 为键存放在 Chatrooms / InactiveChatrooms 分区。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chatroom {
    pub room_id: RoomId,
    pub room_name: RoomName,
    pub owner_id: UserId,
    /// 公开聊天室加入时不需要邀请
    pub public: bool,
}

impl Chatroom {
    pub fn new(room_name: RoomName, owner_id: UserId, public: bool) -> Self {
        Self {
            room_id: RoomId::generate(),
            room_name,
            owner_id,
            public,
        }
    }

    /// 更新可变属性，标识与名称保持不变
    pub fn set_visibility(&mut self, public: bool) {
        self.public = public;
    }
}
