use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RealtimeError;
use crate::value_objects::{ConnectionId, MessageId, RoomId, Timestamp};

/// 消息类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Emoji,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Emoji => "emoji",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "emoji" => Ok(Self::Emoji),
            other => Err(RealtimeError::UnsupportedType(other.to_string())),
        }
    }
}

/// 不透明的消息体：字节 + 类型标签
///
/// 图片、语音消息的 body 通常是媒体服务返回的 URL，核心层不解析。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    pub kind: MessageKind,
    pub body: Vec<u8>,
}

impl MessagePayload {
    pub fn new(kind: MessageKind, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(MessageKind::Text, body.into().into_bytes())
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// 按 UTF-8 解读 body，非法字节会被替换
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 已分配序列号、正在扇出的消息事件
///
/// 构造后不可变；扇出期间以 `Arc` 在所有接收方之间共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: ConnectionId,
    pub payload: MessagePayload,
    /// 按 (发送者, 房间) 单调递增，从 1 开始
    pub sequence: u64,
    pub created_at: Timestamp,
}

impl MessageEvent {
    pub fn new(
        room_id: RoomId,
        sender_id: ConnectionId,
        payload: MessagePayload,
        sequence: u64,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::random(),
            room_id,
            sender_id,
            payload,
            sequence,
            created_at,
        }
    }
}
