use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::{RoomId, RoomName, UserId};

/// 聊天室成员角色。
///
/// 存储为单字节，编码固定为 Owner=0、Moderator=1、Member=2、Blocked=3。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    Owner,
    Moderator,
    Member,
    Blocked,
}

impl MemberRole {
    pub fn as_byte(self) -> u8 {
        match self {
            MemberRole::Owner => 0,
            MemberRole::Moderator => 1,
            MemberRole::Member => 2,
            MemberRole::Blocked => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MemberRole::Owner),
            1 => Some(MemberRole::Moderator),
            2 => Some(MemberRole::Member),
            3 => Some(MemberRole::Blocked),
            _ => None,
        }
    }

    /// 权限等级，数值越大权限越高
    pub fn rank(self) -> u8 {
        3 - self.as_byte()
    }

    pub fn is_owner(self) -> bool {
        self == MemberRole::Owner
    }

    /// 可以修改聊天室、调整角色和发出邀请
    pub fn can_moderate(self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Moderator)
    }

    /// Blocked 不能进行任何聊天室内操作
    pub fn can_participate(self) -> bool {
        self != MemberRole::Blocked
    }
}

impl PartialOrd for MemberRole {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemberRole {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberRole::Owner => "owner",
            MemberRole::Moderator => "moderator",
            MemberRole::Member => "member",
            MemberRole::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// 成员索引键 `{room_name}-{user_id}`
pub fn membership_key(room: &RoomName, user_id: &UserId) -> String {
    format!("{}-{}", room, user_id)
}

/// 成员索引中某个聊天室的前缀 `{room_name}-`
pub fn membership_prefix(room: &RoomName) -> String {
    format!("{}-", room)
}

/// 邀请键 `{room_id}-{user_id}`
pub fn invitation_key(room_id: &RoomId, user_id: &UserId) -> String {
    format!("{}-{}", room_id, user_id)
}

/// 成员列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub user_id: UserId,
    pub role: MemberRole,
}
