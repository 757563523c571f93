use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 聊天室内的实时状态标签。`Delete` 只作为指令使用，不会被存储。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiveStatus {
    Online,
    Background,
    Offline,
    Delete,
}

/// 单个聊天室的在线成员表，整体编码后存放在 LiveMember 分区的 `{room_name}` 键下。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LivePresence(BTreeMap<String, LiveStatus>);

impl LivePresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一次状态变更，`Delete` 移除条目
    pub fn apply(&mut self, username: &str, status: LiveStatus) {
        match status {
            LiveStatus::Delete => {
                self.0.remove(username);
            }
            other => {
                self.0.insert(username.to_owned(), other);
            }
        }
    }

    pub fn status_of(&self, username: &str) -> Option<LiveStatus> {
        self.0.get(username).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, LiveStatus)> {
        self.0.iter().map(|(name, status)| (name.as_str(), *status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_transitions_and_delete() {
        let mut presence = LivePresence::new();
        presence.apply("alice", LiveStatus::Online);
        presence.apply("bob", LiveStatus::Background);
        presence.apply("alice", LiveStatus::Offline);

        assert_eq!(presence.status_of("alice"), Some(LiveStatus::Offline));
        assert_eq!(presence.status_of("bob"), Some(LiveStatus::Background));

        presence.apply("bob", LiveStatus::Delete);
        assert_eq!(presence.status_of("bob"), None);
        assert_eq!(presence.entries().count(), 1);
    }

    #[test]
    fn encodes_as_plain_map() {
        let mut presence = LivePresence::new();
        presence.apply("alice", LiveStatus::Online);
        let encoded = serde_json::to_string(&presence).unwrap();
        assert_eq!(encoded, r#"{"alice":"Online"}"#);
    }
}
