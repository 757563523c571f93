use chrono::Duration;
use domain::{
    message_key, Message, RepositoryError, RepositoryResult, RoomName, Timestamp,
};
use tracing::debug;

use super::{encode, ChatDatabase};
use crate::storage::{KvRead, Partition};

/// 第 `page` 页覆盖的时间窗口：`[now - page*limit 天, now - (page-1)*limit 天]`
fn day_window(page: i64, limit: i64, now: Timestamp) -> RepositoryResult<(Timestamp, Timestamp)> {
    let range = || RepositoryError::PaginationRange { page, limit };
    if page <= 0 || limit <= 0 {
        return Err(range());
    }

    let days = |n: i64| {
        n.checked_mul(limit)
            .and_then(Duration::try_days)
            .and_then(|offset| now.checked_sub_signed(offset))
            .ok_or_else(range)
    };
    Ok((days(page)?, days(page - 1)?))
}

impl ChatDatabase {
    /// 保存消息，聊天室必须处于活跃状态
    pub fn save_message(&self, room: &RoomName, message: &Message) -> RepositoryResult<()> {
        let key = message.storage_key(room);
        self.store.update(|tx| {
            tx.require(Partition::Chatrooms, room.as_str())?;
            if tx.contains(Partition::Messages, key.as_bytes())? {
                return Err(RepositoryError::duplicate_key(
                    key.as_str(),
                    Partition::Messages.name(),
                ));
            }
            tx.put(Partition::Messages, key.as_bytes(), &encode(message)?)
        })?;
        debug!(room = %room, message_id = %message.id, "message stored");
        Ok(())
    }

    /// 按天分页读取历史消息。
    ///
    /// 从窗口起点开始按键序向前扫描，最多 `limit` 条，超过窗口终点即停止。
    /// 返回值是存储记录直接拼接成的 JSON 数组，不做解码。
    pub fn paginate_messages(
        &self,
        room: &RoomName,
        page: i64,
        limit: i64,
        now: Timestamp,
    ) -> RepositoryResult<Vec<u8>> {
        let (start, end) = day_window(page, limit, now)?;
        let max_entries =
            usize::try_from(limit).map_err(|_| RepositoryError::PaginationRange { page, limit })?;

        let prefix = format!("{room}-");
        let seek = message_key(room, &start);
        let end_key = message_key(room, &end);

        let entries = self.store.view(|tx| {
            tx.scan(
                Partition::Messages,
                seek.as_bytes(),
                prefix.as_bytes(),
                Some(max_entries),
            )
        })?;

        let mut body = Vec::with_capacity(2 + entries.iter().map(|(_, v)| v.len() + 1).sum::<usize>());
        body.push(b'[');
        for (index, (_, record)) in entries
            .iter()
            .take_while(|(key, _)| key.as_slice() <= end_key.as_bytes())
            .enumerate()
        {
            if index > 0 {
                body.push(b',');
            }
            body.extend_from_slice(record);
        }
        body.push(b']');
        Ok(body)
    }
}
