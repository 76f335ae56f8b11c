//! WebSocket 帧格式
//!
//! 入站与出站都是 `{"event": ..., "data": {...}}` 形式的 JSON 文本帧，
//! 事件名与字段名使用 camelCase。`joinChat`/`leaveChat` 的 data 也可以直接是房间号字符串。

use domain::{DeliveryReport, MessageEvent, RealtimeError};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// 客户端发来的事件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinChat(ChatRef),
    LeaveChat(ChatRef),
    SendMessage {
        chat_id: String,
        #[serde(alias = "content")]
        payload: String,
        /// 缺省为 text
        #[serde(rename = "type", default)]
        kind: Option<String>,
    },
}

/// 房间引用：`"r1"` 或 `{"chatId": "r1"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChatRef {
    Bare(String),
    Object {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
}

impl ChatRef {
    pub fn into_inner(self) -> String {
        match self {
            Self::Bare(chat_id) | Self::Object { chat_id } => chat_id,
        }
    }
}

/// 服务端推送的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    ReceiveMessage {
        chat_id: String,
        message_id: Uuid,
        sender_id: Uuid,
        payload: String,
        #[serde(rename = "type")]
        kind: String,
        sequence: u64,
        timestamp: String,
    },
    JoinedChat {
        chat_id: String,
        joined: bool,
    },
    LeftChat {
        chat_id: String,
        left: bool,
    },
    MessageAck {
        chat_id: String,
        message_id: Uuid,
        sequence: u64,
        delivered: usize,
        queued: usize,
        dropped_full: usize,
        gone: usize,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn receive_message(event: &MessageEvent) -> Self {
        Self::ReceiveMessage {
            chat_id: event.room_id.to_string(),
            message_id: event.id.0,
            sender_id: event.sender_id.0,
            payload: event.payload.body_lossy(),
            kind: event.payload.kind.as_str().to_string(),
            sequence: event.sequence,
            timestamp: event.created_at.format(&Rfc3339).unwrap_or_default(),
        }
    }

    pub fn message_ack(report: &DeliveryReport) -> Self {
        let summary = report.summary();
        Self::MessageAck {
            chat_id: report.event.room_id.to_string(),
            message_id: report.event.id.0,
            sequence: report.event.sequence,
            delivered: summary.delivered,
            queued: summary.queued,
            dropped_full: summary.dropped_full,
            gone: summary.gone,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&RealtimeError> for ServerEvent {
    fn from(err: &RealtimeError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}
