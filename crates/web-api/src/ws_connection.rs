use std::sync::Arc;

use application::{OutboundReceiver, SessionLifecycleManager};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, MessageKind, MessagePayload, RealtimeError, RoomId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{ClientEvent, ServerEvent};
use crate::state::AppState;

/// WebSocket 连接处理单元
///
/// 每个连接三个任务：
/// - 接收任务：读取 socket，把文本帧放进入站队列
/// - 处理任务：按顺序消费入站队列，调用会话管理器
/// - 发送任务：统一处理所有对 socket 的写操作
///
/// 任意一端结束后关闭会话并回收全部任务。
pub struct WebSocketConnection {
    connection_id: ConnectionId,
    state: AppState,
}

impl WebSocketConnection {
    pub fn new(state: AppState) -> Self {
        Self {
            connection_id: ConnectionId::random(),
            state,
        }
    }

    pub async fn run(self, socket: WebSocket) {
        let connection_id = self.connection_id;
        let sessions = self.state.core.sessions.clone();

        let outbound = match sessions.open(connection_id) {
            Ok(receiver) => receiver,
            Err(err) => {
                tracing::error!(connection_id = %connection_id, error = %err, "会话打开失败");
                return;
            }
        };
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已建立");

        let (sender, mut incoming) = socket.split();

        // 回执、错误帧、pong 走这条通道，不受出站队列背压影响
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCommand>(32);
        let (inbound_tx, mut inbound_rx) =
            mpsc::channel::<String>(self.state.realtime.inbound_queue_capacity);

        let mut send_task = tokio::spawn(write_loop(connection_id, sender, outbound, cmd_rx));

        let mut recv_task = {
            let cmd_tx = cmd_tx.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    match message {
                        WsMessage::Text(text) => {
                            if inbound_tx.send(text.to_string()).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Binary(_) => {
                            let frame = ServerEvent::error("BAD_FRAME", "binary frames are not supported");
                            if cmd_tx.send(WsCommand::Event(frame)).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Ping(data) => {
                            tracing::debug!("收到ping消息，发送pong回应");
                            if cmd_tx.send(WsCommand::Pong(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {}
                        WsMessage::Close(_) => {
                            tracing::info!("WebSocket收到关闭消息");
                            break;
                        }
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        let handler = InboundHandler::new(connection_id, sessions.clone());
        let worker = tokio::spawn(async move {
            while let Some(text) = inbound_rx.recv().await {
                let reply = handler.handle(&text).await;
                if cmd_tx.send(WsCommand::Event(reply)).await.is_err() {
                    break;
                }
            }
        });

        let recv_finished = tokio::select! {
            _ = &mut send_task => {
                tracing::debug!("WebSocket发送任务完成");
                false
            }
            _ = &mut recv_task => {
                tracing::debug!("WebSocket接收任务完成");
                true
            }
        };

        // 先停接收端让入站队列关闭，再等处理任务跑完手上的请求，进行中的发布不能被取消
        if !recv_finished {
            recv_task.abort();
            let _ = recv_task.await;
        }
        if let Err(err) = worker.await {
            tracing::warn!(connection_id = %connection_id, error = %err, "WebSocket处理任务异常退出");
        }
        sessions.close(connection_id).await;
        send_task.abort();

        tracing::info!(connection_id = %connection_id, "WebSocket连接已断开，会话已清理");
    }
}

async fn write_loop(
    connection_id: ConnectionId,
    mut sender: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut outbound: OutboundReceiver,
    mut cmd_rx: mpsc::Receiver<WsCommand>,
) {
    let mut reported_drops = 0;
    loop {
        let message = tokio::select! {
            Some(cmd) = cmd_rx.recv() => match cmd {
                WsCommand::Event(event) => match event.to_json() {
                    Ok(json) => WsMessage::Text(json.into()),
                    Err(err) => {
                        tracing::warn!(error = %err, "WebSocket消息序列化失败");
                        continue;
                    }
                },
                WsCommand::Pong(data) => WsMessage::Pong(data.into()),
            },
            event = outbound.recv() => {
                // 队列被关闭：会话已注销
                let Some(event) = event else { break };
                let dropped = outbound.dropped();
                if dropped > reported_drops {
                    tracing::warn!(
                        connection_id = %connection_id,
                        dropped = dropped - reported_drops,
                        "出站队列已丢弃旧消息"
                    );
                    reported_drops = dropped;
                }
                match ServerEvent::receive_message(&event).to_json() {
                    Ok(json) => WsMessage::Text(json.into()),
                    Err(err) => {
                        tracing::warn!(error = %err, "WebSocket消息序列化失败");
                        continue;
                    }
                }
            }
        };

        if sender.send(message).await.is_err() {
            tracing::warn!(connection_id = %connection_id, "WebSocket帧写入失败");
            break;
        }
    }
    tracing::debug!("WebSocket发送任务结束");
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    Event(ServerEvent),
    Pong(Vec<u8>),
}

/// 入站帧处理：解析事件并调用会话管理器，返回要回写给客户端的帧
pub struct InboundHandler {
    connection_id: ConnectionId,
    sessions: Arc<SessionLifecycleManager>,
}

impl InboundHandler {
    pub fn new(connection_id: ConnectionId, sessions: Arc<SessionLifecycleManager>) -> Self {
        Self {
            connection_id,
            sessions,
        }
    }

    pub async fn handle(&self, text: &str) -> ServerEvent {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(connection_id = %self.connection_id, error = %err, "无法解析的入站帧");
                return ServerEvent::error("BAD_FRAME", err.to_string());
            }
        };

        match self.dispatch(event).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(connection_id = %self.connection_id, code = err.code(), error = %err, "请求被拒绝");
                ServerEvent::from(&err)
            }
        }
    }

    async fn dispatch(&self, event: ClientEvent) -> Result<ServerEvent, RealtimeError> {
        match event {
            ClientEvent::JoinChat(chat) => {
                let room_id = RoomId::parse(chat.into_inner())?;
                let joined = self.sessions.join(self.connection_id, &room_id)?;
                Ok(ServerEvent::JoinedChat {
                    chat_id: room_id.to_string(),
                    joined,
                })
            }
            ClientEvent::LeaveChat(chat) => {
                let room_id = RoomId::parse(chat.into_inner())?;
                let left = self.sessions.leave(self.connection_id, &room_id)?;
                Ok(ServerEvent::LeftChat {
                    chat_id: room_id.to_string(),
                    left,
                })
            }
            ClientEvent::SendMessage {
                chat_id,
                payload,
                kind,
            } => {
                let room_id = RoomId::parse(chat_id)?;
                let kind = match kind.as_deref() {
                    Some(tag) => tag.parse::<MessageKind>()?,
                    None => MessageKind::Text,
                };
                let report = self
                    .sessions
                    .publish(
                        self.connection_id,
                        &room_id,
                        MessagePayload::new(kind, payload.into_bytes()),
                    )
                    .await?;
                Ok(ServerEvent::message_ack(&report))
            }
        }
    }
}
