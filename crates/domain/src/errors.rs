//! 实时投递核心错误定义
//!
//! 结构性错误（重复注册、非法状态等）同步返回给直接调用方；
//! 单个接收方的投递失败只记录在 `DeliveryReport` 中，不会走到这里。

use thiserror::Error;

use crate::session::SessionState;
use crate::value_objects::{ConnectionId, RoomId};

/// 实时核心错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    /// 连接ID已经处于存活状态
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    /// 连接已注销或从未注册
    #[error("connection {0} is gone")]
    ConnectionGone(ConnectionId),

    /// 出站队列已满（reject-new 策略）
    #[error("outbound channel of connection {connection_id} is full (capacity {capacity})")]
    ChannelFull {
        connection_id: ConnectionId,
        capacity: usize,
    },

    /// 消息体超过上限
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// 未知的消息类型标签
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),

    /// 连接不处于 OPEN 状态
    #[error("connection {connection_id} is {state}, operation rejected")]
    InvalidState {
        connection_id: ConnectionId,
        state: SessionState,
    },

    /// 发送者不是该房间成员
    #[error("connection {connection_id} has not joined room {room_id}")]
    RoomNotJoined {
        connection_id: ConnectionId,
        room_id: RoomId,
    },

    /// 房间ID不合法
    #[error("invalid room id: {reason}")]
    InvalidRoomId { reason: String },
}

impl RealtimeError {
    pub fn invalid_room_id(reason: impl Into<String>) -> Self {
        Self::InvalidRoomId {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(connection_id: ConnectionId, state: SessionState) -> Self {
        Self::InvalidState {
            connection_id,
            state,
        }
    }

    /// 稳定的错误码，供传输层回写给客户端
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateConnection(_) => "DUPLICATE_CONNECTION",
            Self::ConnectionGone(_) => "CONNECTION_GONE",
            Self::ChannelFull { .. } => "CHANNEL_FULL",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::RoomNotJoined { .. } => "ROOM_NOT_JOINED",
            Self::InvalidRoomId { .. } => "INVALID_ROOM_ID",
        }
    }
}
