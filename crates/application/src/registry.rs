//! 连接注册表
//!
//! 独占持有所有存活连接：出站队列发送端、存活标记以及已加入的房间。

use std::collections::HashSet;

use config::{OverflowPolicy, RealtimeConfig};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{ConnectionId, RealtimeError, RoomId, Timestamp};
use tracing::info;

use crate::outbound::{self, EnqueueError, OutboundEvent, OutboundReceiver, OutboundSender, SendStatus};

#[derive(Debug)]
struct ConnectionEntry {
    sender: OutboundSender,
    rooms: HashSet<RoomId>,
    connected_at: Timestamp,
}

/// 连接注册表
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            connections: DashMap::new(),
            capacity,
            policy,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.channel_capacity, config.overflow_policy)
    }

    /// 注册新连接，返回其出站队列的接收端
    pub fn register(&self, connection_id: ConnectionId) -> Result<OutboundReceiver, RealtimeError> {
        match self.connections.entry(connection_id) {
            Entry::Occupied(_) => Err(RealtimeError::DuplicateConnection(connection_id)),
            Entry::Vacant(slot) => {
                let (sender, receiver) = outbound::channel(self.capacity, self.policy);
                slot.insert(ConnectionEntry {
                    sender,
                    rooms: HashSet::new(),
                    connected_at: time::OffsetDateTime::now_utc(),
                });
                info!(connection_id = %connection_id, "connection registered");
                Ok(receiver)
            }
        }
    }

    /// 注销连接并关闭出站队列，返回它曾加入的房间；重复调用返回空集合
    pub fn deregister(&self, connection_id: ConnectionId) -> HashSet<RoomId> {
        match self.connections.remove(&connection_id) {
            Some((_, entry)) => {
                entry.sender.close();
                let alive_for = time::OffsetDateTime::now_utc() - entry.connected_at;
                info!(
                    connection_id = %connection_id,
                    rooms = entry.rooms.len(),
                    alive_secs = alive_for.whole_seconds(),
                    "connection deregistered"
                );
                entry.rooms
            }
            None => HashSet::new(),
        }
    }

    /// 非阻塞地把事件放入连接的出站队列
    pub fn send(
        &self,
        connection_id: ConnectionId,
        event: OutboundEvent,
    ) -> Result<SendStatus, RealtimeError> {
        // 先克隆发送端，避免在分片锁内操作队列
        let sender = self
            .connections
            .get(&connection_id)
            .map(|entry| entry.sender.clone())
            .ok_or(RealtimeError::ConnectionGone(connection_id))?;

        sender.try_send(event).map_err(|err| match err {
            EnqueueError::Full => RealtimeError::ChannelFull {
                connection_id,
                capacity: sender.capacity(),
            },
            EnqueueError::Closed => RealtimeError::ConnectionGone(connection_id),
        })
    }

    /// 记录连接加入房间；返回是否为新加入
    pub fn record_join(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<bool, RealtimeError> {
        let mut entry = self
            .connections
            .get_mut(&connection_id)
            .ok_or(RealtimeError::ConnectionGone(connection_id))?;
        Ok(entry.rooms.insert(room_id))
    }

    /// 记录连接离开房间；未加入时为空操作
    pub fn record_leave(&self, connection_id: ConnectionId, room_id: &RoomId) -> bool {
        self.connections
            .get_mut(&connection_id)
            .map(|mut entry| entry.rooms.remove(room_id))
            .unwrap_or(false)
    }

    pub fn joined_rooms(&self, connection_id: ConnectionId) -> HashSet<RoomId> {
        self.connections
            .get(&connection_id)
            .map(|entry| entry.rooms.clone())
            .unwrap_or_default()
    }

    /// 已注册且写任务仍在消费
    pub fn is_live(&self, connection_id: ConnectionId) -> bool {
        self.connections
            .get(&connection_id)
            .map(|entry| !entry.sender.is_closed())
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// 当前出站积压
    pub fn backlog(&self, connection_id: ConnectionId) -> Option<usize> {
        self.connections
            .get(&connection_id)
            .map(|entry| entry.sender.backlog())
    }
}
