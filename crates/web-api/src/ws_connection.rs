//! 单条 WebSocket 连接的读写两个职责。
//!
//! 读端是连接唯一的读者，写端是唯一的写者；任意一端结束都会注销连接并关闭套接字。

use std::time::Duration;

use application::{ApplicationError, Frame, LiveSession};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use config::WebSocketConfig;
use domain::{RepositoryError, UserId};
use futures_util::{stream::SplitStream, Sink, SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    time::{interval_at, timeout, timeout_at, Instant},
};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// 接入广播中心并运行连接，直到任意一端结束
pub async fn serve(mut socket: WebSocket, state: AppState, user_id: UserId, room: String) {
    let (session, outbound) = match state.chat_service.connect(user_id, &room).await {
        Ok(connected) => connected,
        Err(err) => {
            warn!(room = %room, user_id = %user_id, error = %err, "failed to attach live connection");
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    };

    let config = state.websocket.clone();
    let write_wait = Duration::from_secs(config.write_wait_secs);
    let (sink, stream) = socket.split();

    let mut write_task = tokio::spawn(write_pump(sink, outbound, config.clone()));

    let write_finished = tokio::select! {
        _ = read_pump(stream, &state, &session, &config) => false,
        _ = &mut write_task => true,
    };

    // 注销会关闭出站队列，写端随后发送关闭帧并退出
    state.chat_service.disconnect(session).await;
    if !write_finished && timeout(write_wait, &mut write_task).await.is_err() {
        write_task.abort();
    }
    info!(room = %room, user_id = %user_id, "websocket connection finished");
}

async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    state: &AppState,
    session: &LiveSession,
    config: &WebSocketConfig,
) {
    let pong_wait = Duration::from_secs(config.pong_wait_secs);
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let message = match timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(err))) => {
                debug!(room = %session.room, error = %err, "websocket read failed");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                debug!(room = %session.room, user_id = %session.user_id, "read deadline expired");
                return;
            }
        };

        match message {
            WsMessage::Text(text) => {
                let text = text.as_str();
                if text.len() > config.read_limit() {
                    debug!(room = %session.room, size = text.len(), "inbound message too large");
                    return;
                }
                match state.chat_service.receive(session, text).await {
                    Ok(_) => {}
                    Err(ApplicationError::Repository(RepositoryError::AuthorizationFailed {
                        ..
                    })) => {
                        info!(room = %session.room, user_id = %session.user_id, "sender no longer allowed");
                        return;
                    }
                    Err(err) => {
                        debug!(room = %session.room, error = %err, "inbound message rejected");
                    }
                }
            }
            WsMessage::Pong(_) => deadline = Instant::now() + pong_wait,
            WsMessage::Close(_) => return,
            WsMessage::Ping(_) | WsMessage::Binary(_) => {}
        }
    }
}

async fn write_pump<S>(mut sink: S, mut outbound: mpsc::Receiver<Frame>, config: WebSocketConfig)
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let write_wait = Duration::from_secs(config.write_wait_secs);
    let period = config.ping_period();
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    // 队列被广播中心关闭
                    let _ = timeout(write_wait, sink.send(WsMessage::Close(None))).await;
                    return;
                };
                let payload = coalesce(&frame, &mut outbound);
                if !send_within(&mut sink, WsMessage::Text(payload.into()), write_wait).await {
                    return;
                }
            }
            _ = ticker.tick() => {
                if !send_within(&mut sink, WsMessage::Ping(Vec::new().into()), write_wait).await {
                    return;
                }
            }
        }
    }
}

/// 把队列中已经积压的帧合并成一次写入，以换行分隔
fn coalesce(first: &Frame, outbound: &mut mpsc::Receiver<Frame>) -> String {
    let mut payload = String::from(&**first);
    while let Ok(next) = outbound.try_recv() {
        payload.push('\n');
        payload.push_str(&next);
    }
    payload
}

async fn send_within<S>(sink: &mut S, message: WsMessage, wait: Duration) -> bool
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    match timeout(wait, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!(error = %err, "websocket write failed");
            false
        }
        Err(_) => {
            debug!("websocket write timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{convert::Infallible, sync::Arc};

    use application::HubHandle;
    use config::HubConfig;
    use domain::RoomName;
    use futures_util::sink;
    use tokio::sync::oneshot;

    fn config() -> WebSocketConfig {
        WebSocketConfig {
            pong_wait_secs: 60,
            write_wait_secs: 5,
            max_message_size: 512,
        }
    }

    /// 记录写出的每一帧；第一次写入停在 `gate` 上，模拟对端不读导致的写阻塞
    fn gated_sink(
        seen: mpsc::UnboundedSender<WsMessage>,
        gate: oneshot::Receiver<()>,
    ) -> impl Sink<WsMessage, Error = Infallible> + Unpin {
        Box::pin(sink::unfold(
            (seen, Some(gate)),
            |(seen, gate), message: WsMessage| async move {
                let _ = seen.send(message);
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok::<_, Infallible>((seen, None))
            },
        ))
    }

    async fn next_seen(seen: &mut mpsc::UnboundedReceiver<WsMessage>) -> WsMessage {
        timeout(Duration::from_secs(2), seen.recv())
            .await
            .expect("frame before timeout")
            .expect("sink still open")
    }

    #[tokio::test]
    async fn backlog_is_joined_with_newlines() {
        let (tx, mut rx) = mpsc::channel::<Frame>(8);
        tx.send(Arc::from("b")).await.unwrap();
        tx.send(Arc::from("c")).await.unwrap();

        let first: Frame = Arc::from("a");
        assert_eq!(coalesce(&first, &mut rx), "a\nb\nc");
        assert_eq!(coalesce(&first, &mut rx), "a");
    }

    #[tokio::test]
    async fn evicted_client_gets_a_close_frame() {
        let room = RoomName::parse("generalchat42").unwrap();
        let hub = HubHandle::spawn(
            room,
            &HubConfig {
                client_queue: 1,
                channel_capacity: 16,
            },
        );
        let stalled = hub.register().await.unwrap();
        let mut observer = hub.register().await.unwrap();

        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let (open_gate, gate) = oneshot::channel();
        let writer = tokio::spawn(write_pump(
            gated_sink(seen_tx, gate),
            stalled.receiver,
            config(),
        ));

        hub.broadcast("first").await.unwrap();
        assert_eq!(next_seen(&mut seen).await, WsMessage::Text("first".into()));

        // 写端卡在 "first" 上，"second" 占满容量为 1 的队列，"third" 触发剔除
        hub.broadcast("second").await.unwrap();
        hub.broadcast("third").await.unwrap();
        for expected in ["first", "second", "third"] {
            let frame = observer.receiver.recv().await.unwrap();
            assert_eq!(&*frame, expected);
        }

        open_gate.send(()).unwrap();
        assert_eq!(next_seen(&mut seen).await, WsMessage::Text("second".into()));
        assert_eq!(next_seen(&mut seen).await, WsMessage::Close(None));
        timeout(Duration::from_secs(2), writer)
            .await
            .expect("writer exits")
            .unwrap();
    }

    #[tokio::test]
    async fn closed_queue_sends_close_and_exits() {
        let (tx, rx) = mpsc::channel::<Frame>(4);
        tx.send(Arc::from("bye")).await.unwrap();
        drop(tx);

        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let (open_gate, gate) = oneshot::channel();
        open_gate.send(()).unwrap();
        write_pump(gated_sink(seen_tx, gate), rx, config()).await;

        assert_eq!(next_seen(&mut seen).await, WsMessage::Text("bye".into()));
        assert_eq!(next_seen(&mut seen).await, WsMessage::Close(None));
    }
}
