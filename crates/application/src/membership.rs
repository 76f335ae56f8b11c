//! 房间成员索引
//!
//! 房间ID -> 连接ID 集合。按分片加锁，不相关的房间互不阻塞；
//! 读取时在分片锁内复制集合，得到一致的时间点快照。

use std::collections::HashSet;

use dashmap::DashMap;
use domain::{ConnectionId, RoomId};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RoomMembershipIndex {
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl RoomMembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入房间（幂等）；房间在首次加入时创建
    pub fn join(&self, room_id: &RoomId, connection_id: ConnectionId) -> bool {
        let added = self
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id);
        debug!(room_id = %room_id, connection_id = %connection_id, added, "join");
        added
    }

    /// 离开房间（幂等）；最后一个成员离开时回收房间
    pub fn leave(&self, room_id: &RoomId, connection_id: ConnectionId) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut members) => members.remove(&connection_id),
            None => false,
        };
        // 必须先释放上面的分片守卫，否则 remove_if 会在同一分片上死锁
        if removed {
            self.rooms.remove_if(room_id, |_, members| members.is_empty());
        }
        debug!(room_id = %room_id, connection_id = %connection_id, removed, "leave");
        removed
    }

    /// 成员快照；不存在的房间返回空集合
    pub fn members_of(&self, room_id: &RoomId) -> HashSet<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, room_id: &RoomId, connection_id: ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .map(|members| members.contains(&connection_id))
            .unwrap_or(false)
    }

    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map(|m| m.len()).unwrap_or(0)
    }

    /// 当前非空房间数
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
