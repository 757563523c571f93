//! 聊天室广播中心
//!
//! 每个活跃聊天室一个 `Hub`，由单独的协调任务独占连接集合。
//! 其他组件只能通过注册、注销、广播三个队列与它交互。

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use config::HubConfig;
use domain::RoomName;
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex,
};
use tracing::{debug, info, warn};

/// 下发给连接的一帧文本
pub type Frame = Arc<str>;

pub type ClientId = u64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("hub for room {room} is closed")]
    Closed { room: String },
}

impl HubError {
    fn closed(room: &RoomName) -> Self {
        Self::Closed {
            room: room.to_string(),
        }
    }
}

struct ClientEntry {
    id: ClientId,
    outbound: mpsc::Sender<Frame>,
}

/// 连接注册成功后拿到的出站队列
pub struct ClientSubscription {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<Frame>,
}

struct Hub {
    room: RoomName,
    clients: HashMap<ClientId, mpsc::Sender<Frame>>,
    register_rx: mpsc::Receiver<ClientEntry>,
    unregister_rx: mpsc::Receiver<ClientId>,
    broadcast_rx: mpsc::Receiver<Frame>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Hub {
    async fn run(mut self) {
        info!(room = %self.room, "hub started");
        loop {
            tokio::select! {
                biased;
                Some(()) = self.shutdown_rx.recv() => {
                    info!(room = %self.room, clients = self.clients.len(), "hub shutting down");
                    self.register_rx.close();
                    self.unregister_rx.close();
                    self.broadcast_rx.close();
                    // 丢弃全部发送端，每个连接的写端随后发送关闭帧
                    self.clients.clear();
                    break;
                }
                Some(entry) = self.register_rx.recv() => {
                    debug!(room = %self.room, client = entry.id, "client registered");
                    self.clients.insert(entry.id, entry.outbound);
                }
                Some(id) = self.unregister_rx.recv() => {
                    // 丢弃发送端即关闭该连接的出站队列
                    if self.clients.remove(&id).is_some() {
                        debug!(room = %self.room, client = id, "client unregistered");
                    }
                }
                Some(frame) = self.broadcast_rx.recv() => {
                    self.fan_out(frame);
                }
                else => break,
            }
        }
        info!(room = %self.room, "hub stopped");
    }

    fn fan_out(&mut self, frame: Frame) {
        let room = &self.room;
        self.clients
            .retain(|id, outbound| match outbound.try_send(Arc::clone(&frame)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(room = %room, client = *id, "outbound queue full, dropping slow client");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(room = %room, client = *id, "outbound queue closed, removing client");
                    false
                }
            });
    }
}

/// 广播中心的句柄，可以自由克隆。全部句柄释放后协调任务退出。
#[derive(Clone)]
pub struct HubHandle {
    room: RoomName,
    client_queue: usize,
    next_client: Arc<AtomicU64>,
    register_tx: mpsc::Sender<ClientEntry>,
    unregister_tx: mpsc::Sender<ClientId>,
    broadcast_tx: mpsc::Sender<Frame>,
    shutdown_tx: mpsc::Sender<()>,
}

impl HubHandle {
    /// 创建广播中心并启动它的协调任务，必须在 tokio 运行时中调用
    pub fn spawn(room: RoomName, config: &HubConfig) -> Self {
        let (register_tx, register_rx) = mpsc::channel(config.channel_capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(config.channel_capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let hub = Hub {
            room: room.clone(),
            clients: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            shutdown_rx,
        };
        tokio::spawn(hub.run());

        Self {
            room,
            client_queue: config.client_queue,
            next_client: Arc::new(AtomicU64::new(1)),
            register_tx,
            unregister_tx,
            broadcast_tx,
            shutdown_tx,
        }
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    /// 两个句柄是否指向同一个协调任务
    pub fn same_hub(&self, other: &HubHandle) -> bool {
        Arc::ptr_eq(&self.next_client, &other.next_client)
    }

    /// 让协调任务断开全部连接并退出，之后通过任何句柄的操作都返回 `Closed`
    pub fn shutdown(&self) {
        // 队列已满说明关闭信号已经在途
        let _ = self.shutdown_tx.try_send(());
    }

    pub async fn register(&self) -> Result<ClientSubscription, HubError> {
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        let (outbound, receiver) = mpsc::channel(self.client_queue);
        self.register_tx
            .send(ClientEntry { id, outbound })
            .await
            .map_err(|_| HubError::closed(&self.room))?;
        Ok(ClientSubscription { id, receiver })
    }

    pub async fn unregister(&self, id: ClientId) -> Result<(), HubError> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| HubError::closed(&self.room))
    }

    pub async fn broadcast(&self, frame: impl Into<Frame>) -> Result<(), HubError> {
        self.broadcast_tx
            .send(frame.into())
            .await
            .map_err(|_| HubError::closed(&self.room))
    }
}

struct HubEntry {
    handle: HubHandle,
    sessions: usize,
}

/// 进程级的聊天室到广播中心映射
///
/// 每个实时连接通过 `acquire` 持有一个租约，最后一个租约 `release` 时
/// 广播中心被移除并关闭。
pub struct HubRegistry {
    config: HubConfig,
    hubs: Mutex<HashMap<RoomName, HubEntry>>,
}

impl HubRegistry {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            hubs: Mutex::new(HashMap::new()),
        }
    }

    fn entry<'a>(&self, hubs: &'a mut HashMap<RoomName, HubEntry>, room: &RoomName) -> &'a mut HubEntry {
        hubs.entry(room.clone()).or_insert_with(|| HubEntry {
            handle: HubHandle::spawn(room.clone(), &self.config),
            sessions: 0,
        })
    }

    /// 不存在时创建并启动，协调任务只会启动一次
    pub async fn get_or_create(&self, room: &RoomName) -> HubHandle {
        let mut hubs = self.hubs.lock().await;
        self.entry(&mut hubs, room).handle.clone()
    }

    /// 与 `get_or_create` 相同，并为一条实时连接记一个租约
    pub async fn acquire(&self, room: &RoomName) -> HubHandle {
        let mut hubs = self.hubs.lock().await;
        let entry = self.entry(&mut hubs, room);
        entry.sessions += 1;
        entry.handle.clone()
    }

    /// 归还 `acquire` 得到的租约。
    ///
    /// 句柄属于已经被替换或关闭的广播中心时不做任何事。
    pub async fn release(&self, hub: &HubHandle) {
        let mut hubs = self.hubs.lock().await;
        let Some(entry) = hubs.get_mut(hub.room()) else {
            return;
        };
        if !entry.handle.same_hub(hub) {
            return;
        }
        entry.sessions = entry.sessions.saturating_sub(1);
        if entry.sessions == 0 {
            if let Some(entry) = hubs.remove(hub.room()) {
                debug!(room = %hub.room(), "last session released, closing hub");
                entry.handle.shutdown();
            }
        }
    }

    pub async fn get(&self, room: &RoomName) -> Option<HubHandle> {
        self.hubs
            .lock()
            .await
            .get(room)
            .map(|entry| entry.handle.clone())
    }

    /// 移除并关闭广播中心，仍然连接着的客户端全部被断开
    pub async fn close(&self, room: &RoomName) -> bool {
        match self.hubs.lock().await.remove(room) {
            Some(entry) => {
                entry.handle.shutdown();
                true
            }
            None => false,
        }
    }

    pub async fn active_rooms(&self) -> usize {
        self.hubs.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn room() -> RoomName {
        RoomName::parse("generalchat42").unwrap()
    }

    fn config(client_queue: usize) -> HubConfig {
        HubConfig {
            client_queue,
            channel_capacity: 16,
        }
    }

    async fn recv(sub: &mut ClientSubscription) -> Option<Frame> {
        timeout(Duration::from_secs(1), sub.receiver.recv())
            .await
            .expect("receive timed out")
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client_in_order() {
        let hub = HubHandle::spawn(room(), &config(8));
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();

        hub.broadcast("one").await.unwrap();
        hub.broadcast("two").await.unwrap();

        for sub in [&mut a, &mut b] {
            assert_eq!(recv(sub).await.as_deref(), Some("one"));
            assert_eq!(recv(sub).await.as_deref(), Some("two"));
        }
    }

    #[tokio::test]
    async fn unregister_closes_outbound_queue() {
        let hub = HubHandle::spawn(room(), &config(8));
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();

        hub.unregister(a.id).await.unwrap();
        hub.broadcast("after").await.unwrap();

        assert_eq!(recv(&mut a).await, None);
        assert_eq!(recv(&mut b).await.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn full_queue_evicts_only_the_slow_client() {
        let hub = HubHandle::spawn(room(), &config(1));
        let mut slow = hub.register().await.unwrap();
        let mut fast = hub.register().await.unwrap();

        hub.broadcast("first").await.unwrap();
        assert_eq!(recv(&mut fast).await.as_deref(), Some("first"));

        // slow 的队列已满，这一条导致它被剔除
        hub.broadcast("second").await.unwrap();
        assert_eq!(recv(&mut fast).await.as_deref(), Some("second"));

        assert_eq!(recv(&mut slow).await.as_deref(), Some("first"));
        assert_eq!(recv(&mut slow).await, None);

        hub.broadcast("third").await.unwrap();
        assert_eq!(recv(&mut fast).await.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn registry_creates_one_hub_per_room() {
        let registry = HubRegistry::new(config(8));
        let first = registry.get_or_create(&room()).await;
        let second = registry.get_or_create(&room()).await;

        let mut sub = first.register().await.unwrap();
        second.broadcast("shared").await.unwrap();
        assert_eq!(recv(&mut sub).await.as_deref(), Some("shared"));
        assert_eq!(registry.active_rooms().await, 1);

        assert!(registry.close(&room()).await);
        assert!(registry.get(&room()).await.is_none());
        assert!(!registry.close(&room()).await);
    }

    #[tokio::test]
    async fn close_disconnects_every_client() {
        let registry = HubRegistry::new(config(8));
        let hub = registry.acquire(&room()).await;
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();

        assert!(registry.close(&room()).await);
        assert_eq!(recv(&mut a).await, None);
        assert_eq!(recv(&mut b).await, None);
        assert_eq!(
            hub.broadcast("late").await,
            Err(HubError::Closed {
                room: "generalchat42".to_string()
            })
        );

        // 重新创建的广播中心与旧连接无关
        let fresh = registry.get_or_create(&room()).await;
        assert!(!fresh.same_hub(&hub));
        let mut c = fresh.register().await.unwrap();
        fresh.broadcast("again").await.unwrap();
        assert_eq!(recv(&mut c).await.as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn last_release_removes_the_hub() {
        let registry = HubRegistry::new(config(8));
        let first = registry.acquire(&room()).await;
        let second = registry.acquire(&room()).await;
        assert!(first.same_hub(&second));
        let mut sub = second.register().await.unwrap();

        registry.release(&first).await;
        assert_eq!(registry.active_rooms().await, 1);

        registry.release(&second).await;
        assert_eq!(registry.active_rooms().await, 0);
        assert_eq!(recv(&mut sub).await, None);
    }

    #[tokio::test]
    async fn stale_release_does_not_touch_a_newer_hub() {
        let registry = HubRegistry::new(config(8));
        let old = registry.acquire(&room()).await;
        registry.close(&room()).await;

        let current = registry.acquire(&room()).await;
        registry.release(&old).await;
        assert_eq!(registry.active_rooms().await, 1);
        assert!(registry.get(&room()).await.unwrap().same_hub(&current));
    }

    #[tokio::test]
    async fn hub_stops_after_all_handles_are_dropped() {
        let hub = HubHandle::spawn(room(), &config(8));
        let mut sub = hub.register().await.unwrap();
        drop(hub);

        // 协调任务退出时释放所有发送端
        assert_eq!(recv(&mut sub).await, None);
    }
}
