//! 存储引擎
//!
//! 基于 redb 的事务型 KV 存储：每个分区是一张有序的字节键值表，
//! 写事务同一时刻只允许一个，读事务看到一致的快照。

use std::{collections::HashSet, path::Path};

use domain::{RepositoryError, RepositoryResult};
use redb::{
    backends::InMemoryBackend, Database, ReadTransaction, ReadableTable, TableDefinition,
    TableError, TableHandle, WriteTransaction,
};
use tracing::{debug, warn};

type PartitionTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// 一条键值记录
pub type Entry = (Vec<u8>, Vec<u8>);

/// 命名分区，名称是稳定的存储标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Chatrooms,
    InactiveChatrooms,
    ChatroomMembers,
    LiveMember,
    Messages,
    Users,
    DeactivatedUsers,
    UserNames,
    UsersOnline,
    UserTokens,
    Invitations,
}

impl Partition {
    pub const ALL: [Partition; 11] = [
        Partition::Chatrooms,
        Partition::InactiveChatrooms,
        Partition::ChatroomMembers,
        Partition::LiveMember,
        Partition::Messages,
        Partition::Users,
        Partition::DeactivatedUsers,
        Partition::UserNames,
        Partition::UsersOnline,
        Partition::UserTokens,
        Partition::Invitations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Partition::Chatrooms => "Chatrooms",
            Partition::InactiveChatrooms => "InactiveChatrooms",
            Partition::ChatroomMembers => "ChatroomMembers",
            Partition::LiveMember => "LiveMember",
            Partition::Messages => "Messages",
            Partition::Users => "Users",
            Partition::DeactivatedUsers => "DeactivatedUsers",
            Partition::UserNames => "UserNames",
            Partition::UsersOnline => "UsersOnline",
            Partition::UserTokens => "UserTokens",
            Partition::Invitations => "Invitations",
        }
    }

    fn definition(self) -> PartitionTable {
        TableDefinition::new(self.name())
    }
}

fn storage_error(err: impl Into<redb::Error>) -> RepositoryError {
    let err: redb::Error = err.into();
    RepositoryError::storage(err.to_string())
}

fn table_error(partition: Partition, err: TableError) -> RepositoryError {
    match err {
        TableError::TableDoesNotExist(_) => RepositoryError::partition_not_found(partition.name()),
        other => storage_error(other),
    }
}

/// 从 `seek` 开始顺序扫描，遇到不匹配 `prefix` 的键即停止
fn scan_table<T>(
    table: &T,
    seek: &[u8],
    prefix: &[u8],
    limit: Option<usize>,
) -> RepositoryResult<Vec<Entry>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut entries = Vec::new();
    for item in table.range(seek..).map_err(storage_error)? {
        if limit.is_some_and(|max| entries.len() >= max) {
            break;
        }
        let (key, value) = item.map_err(storage_error)?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key.to_vec(), value.value().to_vec()));
    }
    Ok(entries)
}

/// 读写事务共用的只读操作
pub trait KvRead {
    fn get(&self, partition: Partition, key: &[u8]) -> RepositoryResult<Option<Vec<u8>>>;

    fn scan(
        &self,
        partition: Partition,
        seek: &[u8],
        prefix: &[u8],
        limit: Option<usize>,
    ) -> RepositoryResult<Vec<Entry>>;

    fn contains(&self, partition: Partition, key: &[u8]) -> RepositoryResult<bool> {
        Ok(self.get(partition, key)?.is_some())
    }

    /// 点查，未命中时返回 `RecordNotFound`
    fn require(&self, partition: Partition, key: &str) -> RepositoryResult<Vec<u8>> {
        self.get(partition, key.as_bytes())?
            .ok_or_else(|| RepositoryError::record_not_found(key, partition.name()))
    }

    /// 扫描整个前缀
    fn scan_prefix(&self, partition: Partition, prefix: &[u8]) -> RepositoryResult<Vec<Entry>> {
        self.scan(partition, prefix, prefix, None)
    }
}

pub struct ReadTx {
    txn: ReadTransaction,
}

impl KvRead for ReadTx {
    fn get(&self, partition: Partition, key: &[u8]) -> RepositoryResult<Option<Vec<u8>>> {
        let table = self
            .txn
            .open_table(partition.definition())
            .map_err(|err| table_error(partition, err))?;
        let value = table
            .get(key)
            .map_err(storage_error)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn scan(
        &self,
        partition: Partition,
        seek: &[u8],
        prefix: &[u8],
        limit: Option<usize>,
    ) -> RepositoryResult<Vec<Entry>> {
        let table = self
            .txn
            .open_table(partition.definition())
            .map_err(|err| table_error(partition, err))?;
        scan_table(&table, seek, prefix, limit)
    }
}

pub struct WriteTx {
    txn: WriteTransaction,
    // 事务开始时已存在的分区；redb 的写事务会隐式建表，这里先行拦截
    partitions: HashSet<String>,
}

impl WriteTx {
    fn begin(txn: WriteTransaction) -> RepositoryResult<Self> {
        let partitions = txn
            .list_tables()
            .map_err(storage_error)?
            .map(|handle| handle.name().to_string())
            .collect();
        Ok(Self { txn, partitions })
    }

    fn table(
        &self,
        partition: Partition,
    ) -> RepositoryResult<redb::Table<'_, &'static [u8], &'static [u8]>> {
        if !self.partitions.contains(partition.name()) {
            return Err(RepositoryError::partition_not_found(partition.name()));
        }
        self.txn
            .open_table(partition.definition())
            .map_err(|err| table_error(partition, err))
    }

    /// 插入或覆盖
    pub fn put(&self, partition: Partition, key: &[u8], value: &[u8]) -> RepositoryResult<()> {
        let mut table = self.table(partition)?;
        table.insert(key, value).map_err(storage_error)?;
        Ok(())
    }

    /// 删除并返回键原本是否存在
    pub fn delete(&self, partition: Partition, key: &[u8]) -> RepositoryResult<bool> {
        let mut table = self.table(partition)?;
        let existed = table.remove(key).map_err(storage_error)?.is_some();
        Ok(existed)
    }

    fn commit(self) -> RepositoryResult<()> {
        self.txn.commit().map_err(storage_error)
    }

    fn abort(self) {
        if let Err(err) = self.txn.abort() {
            warn!(error = %err, "failed to abort write transaction");
        }
    }
}

impl KvRead for WriteTx {
    fn get(&self, partition: Partition, key: &[u8]) -> RepositoryResult<Option<Vec<u8>>> {
        let table = self.table(partition)?;
        let value = table
            .get(key)
            .map_err(storage_error)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn scan(
        &self,
        partition: Partition,
        seek: &[u8],
        prefix: &[u8],
        limit: Option<usize>,
    ) -> RepositoryResult<Vec<Entry>> {
        let table = self.table(partition)?;
        scan_table(&table, seek, prefix, limit)
    }
}

/// 存储引擎句柄
pub struct Store {
    db: Database,
}

impl Store {
    /// 打开（或创建）存储文件并确保所有分区存在
    pub fn open(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let db = Database::create(path.as_ref()).map_err(storage_error)?;
        let store = Self { db };
        store.initialize(&Partition::ALL)?;
        debug!(path = %path.as_ref().display(), "storage opened");
        Ok(store)
    }

    /// 内存存储，用于测试
    pub fn in_memory() -> RepositoryResult<Self> {
        Self::in_memory_with(&Partition::ALL)
    }

    /// 只创建指定分区的内存存储
    pub fn in_memory_with(partitions: &[Partition]) -> RepositoryResult<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage_error)?;
        let store = Self { db };
        store.initialize(partitions)?;
        Ok(store)
    }

    fn initialize(&self, partitions: &[Partition]) -> RepositoryResult<()> {
        let txn = self.db.begin_write().map_err(storage_error)?;
        for partition in partitions {
            txn.open_table(partition.definition())
                .map_err(|err| table_error(*partition, err))?;
        }
        txn.commit().map_err(storage_error)
    }

    /// 写事务：闭包返回 `Ok` 时提交，返回错误时整体回滚
    pub fn update<T, F>(&self, op: F) -> RepositoryResult<T>
    where
        F: FnOnce(&WriteTx) -> RepositoryResult<T>,
    {
        let txn = self.db.begin_write().map_err(storage_error)?;
        let tx = WriteTx::begin(txn)?;
        match op(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.abort();
                Err(err)
            }
        }
    }

    /// 读事务，看到开始时刻的一致快照
    pub fn view<T, F>(&self, op: F) -> RepositoryResult<T>
    where
        F: FnOnce(&ReadTx) -> RepositoryResult<T>,
    {
        let txn = self.db.begin_read().map_err(storage_error)?;
        op(&ReadTx { txn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_writes_are_visible() {
        let store = Store::in_memory().unwrap();
        store
            .update(|tx| tx.put(Partition::Users, b"k1", b"v1"))
            .unwrap();

        let value = store.view(|tx| tx.get(Partition::Users, b"k1")).unwrap();
        assert_eq!(value.as_deref(), Some(&b"v1"[..]));

        let existed = store
            .update(|tx| tx.delete(Partition::Users, b"k1"))
            .unwrap();
        assert!(existed);
        assert!(!store
            .view(|tx| tx.contains(Partition::Users, b"k1"))
            .unwrap());
    }

    #[test]
    fn failed_transaction_leaves_state_unchanged() {
        let store = Store::in_memory().unwrap();
        let result: RepositoryResult<()> = store.update(|tx| {
            tx.put(Partition::Users, b"a", b"1")?;
            tx.put(Partition::UserNames, b"b", b"2")?;
            Err(RepositoryError::duplicate_key("b", "UserNames"))
        });
        assert!(result.is_err());

        store
            .view(|tx| {
                assert!(!tx.contains(Partition::Users, b"a")?);
                assert!(!tx.contains(Partition::UserNames, b"b")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn missing_partition_is_reported_and_not_created() {
        let store = Store::in_memory_with(&[Partition::Users]).unwrap();

        let read = store.view(|tx| tx.get(Partition::Chatrooms, b"room"));
        assert!(matches!(read, Err(RepositoryError::PartitionNotFound { .. })));

        let write = store.update(|tx| tx.put(Partition::Chatrooms, b"room", b"x"));
        assert!(matches!(write, Err(RepositoryError::PartitionNotFound { .. })));

        let again = store.view(|tx| tx.get(Partition::Chatrooms, b"room"));
        assert!(matches!(again, Err(RepositoryError::PartitionNotFound { .. })));
    }

    #[test]
    fn scan_is_ordered_and_stops_at_prefix_boundary() {
        let store = Store::in_memory().unwrap();
        store
            .update(|tx| {
                tx.put(Partition::Messages, b"roomA-3", b"c")?;
                tx.put(Partition::Messages, b"roomA-1", b"a")?;
                tx.put(Partition::Messages, b"roomA-2", b"b")?;
                tx.put(Partition::Messages, b"roomB-1", b"z")?;
                Ok(())
            })
            .unwrap();

        let all = store
            .view(|tx| tx.scan_prefix(Partition::Messages, b"roomA-"))
            .unwrap();
        let values: Vec<_> = all.iter().map(|(_, v)| v.as_slice()).collect();
        assert_eq!(values, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);

        let limited = store
            .view(|tx| tx.scan(Partition::Messages, b"roomA-2", b"roomA-", Some(5)))
            .unwrap();
        assert_eq!(limited.len(), 2);

        let capped = store
            .view(|tx| tx.scan(Partition::Messages, b"roomA-", b"roomA-", Some(1)))
            .unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn readers_see_a_consistent_snapshot() {
        let store = Store::in_memory().unwrap();
        store
            .update(|tx| tx.put(Partition::Users, b"k", b"old"))
            .unwrap();

        store
            .view(|snapshot| {
                store.update(|tx| tx.put(Partition::Users, b"k", b"new"))?;
                assert_eq!(
                    snapshot.get(Partition::Users, b"k")?.as_deref(),
                    Some(&b"old"[..])
                );
                Ok(())
            })
            .unwrap();

        let latest = store.view(|tx| tx.get(Partition::Users, b"k")).unwrap();
        assert_eq!(latest.as_deref(), Some(&b"new"[..]));
    }
}
