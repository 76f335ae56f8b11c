use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::RealtimeError;

/// 统一的时间戳类型。
pub type Timestamp = OffsetDateTime;

/// 房间ID允许的最大字节数
pub const MAX_ROOM_ID_LEN: usize = 128;

/// 连接唯一标识，由传输层在握手时分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// 生成随机连接ID
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<ConnectionId> for Uuid {
    fn from(value: ConnectionId) -> Self {
        value.0
    }
}

/// 聊天室唯一标识（即客户端的 chatId）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(value: impl Into<String>) -> Result<Self, RealtimeError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(RealtimeError::invalid_room_id("cannot be empty"));
        }
        if value.len() > MAX_ROOM_ID_LEN {
            return Err(RealtimeError::invalid_room_id("too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RealtimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for RoomId {
    type Error = RealtimeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomId> for String {
    fn from(value: RoomId) -> Self {
        value.0
    }
}

/// 消息唯一标识，供下游持久化做幂等去重。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_is_trimmed() {
        let room = RoomId::parse("  general ").unwrap();
        assert_eq!(room.as_str(), "general");
    }

    #[test]
    fn room_id_rejects_blank_and_oversized() {
        assert!(RoomId::parse("   ").is_err());
        assert!(RoomId::parse("x".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
        assert!(RoomId::parse("x".repeat(MAX_ROOM_ID_LEN)).is_ok());
    }

    #[test]
    fn room_id_deserializes_through_validation() {
        let room: RoomId = serde_json::from_str("\"r1\"").unwrap();
        assert_eq!(room.to_string(), "r1");
        assert!(serde_json::from_str::<RoomId>("\"\"").is_err());
    }
}
