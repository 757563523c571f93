use serde::{Deserialize, Serialize};

use crate::presence::LiveStatus;
use crate::value_objects::{timestamp_key, MessageContent, MessageId, RoomName, Timestamp, UserId};

/// 聊天消息，写入后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub time_stamp: Timestamp,
    pub user_id: UserId,
    pub content: String,
}

impl Message {
    pub fn new(user_id: UserId, content: MessageContent, time_stamp: Timestamp) -> Self {
        Self {
            id: MessageId::generate(),
            time_stamp,
            user_id,
            content: content.into_inner(),
        }
    }

    /// 存储键 `{room_name}-{timestamp}`
    pub fn storage_key(&self, room: &RoomName) -> String {
        message_key(room, &self.time_stamp)
    }
}

pub fn message_key(room: &RoomName, ts: &Timestamp) -> String {
    format!("{}-{}", room, timestamp_key(ts))
}

/// 在线状态变更通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotice {
    pub username: String,
    pub status: LiveStatus,
}

/// 推送给实时连接的消息信封，序列化为 `{"UserMessage": {...}}` 或 `{"APIStatus": {...}}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveEvent {
    UserMessage(Message),
    #[serde(rename = "APIStatus")]
    ApiStatus(StatusNotice),
}

impl LiveEvent {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn storage_key_embeds_room_and_timestamp() {
        let room = RoomName::parse("generalchat42").unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let message = Message::new(UserId::generate(), MessageContent::parse("hi").unwrap(), ts);

        assert_eq!(
            message.storage_key(&room),
            "generalchat42-20240506070809.000000000"
        );
    }

    #[test]
    fn live_event_envelopes() {
        let message = Message::new(
            UserId::generate(),
            MessageContent::parse("hi").unwrap(),
            Utc::now(),
        );
        let frame = LiveEvent::UserMessage(message.clone()).to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["UserMessage"]["content"], "hi");
        assert_eq!(value["UserMessage"]["id"], message.id.to_string());

        let frame = LiveEvent::ApiStatus(StatusNotice {
            username: "bob".into(),
            status: LiveStatus::Online,
        })
        .to_frame()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["APIStatus"]["username"], "bob");
        assert_eq!(value["APIStatus"]["status"], "Online");
    }
}
