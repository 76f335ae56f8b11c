use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use domain::{ConnectionId, RoomId};

/// 单个 (发送者, 房间) 的序列号通道
///
/// 持锁期间完成"分配序列号 + 扇出入队"，保证入队顺序与序列号一致。
/// 锁内不允许 `.await`。
#[derive(Debug, Default)]
pub struct SequenceLane {
    last: Mutex<u64>,
}

impl SequenceLane {
    /// 分配下一个序列号，并在持锁状态下执行 `f`
    pub fn with_next<R>(&self, f: impl FnOnce(u64) -> R) -> R {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last += 1;
        f(*last)
    }

    pub fn last(&self) -> u64 {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 内存序列号分配器
/// 每个 (发送者, 房间) 维护递增序列号，不做跨发送者的全局排序
#[derive(Debug, Default)]
pub struct MessageSequencer {
    lanes: DashMap<(ConnectionId, RoomId), Arc<SequenceLane>>,
}

impl MessageSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建序列号通道
    pub fn lane(&self, sender: ConnectionId, room_id: &RoomId) -> Arc<SequenceLane> {
        self.lanes
            .entry((sender, room_id.clone()))
            .or_default()
            .clone()
    }

    /// 最近分配的序列号；从未发送过时为 0
    pub fn last_sequence(&self, sender: ConnectionId, room_id: &RoomId) -> u64 {
        self.lanes
            .get(&(sender, room_id.clone()))
            .map(|lane| lane.last())
            .unwrap_or(0)
    }

    /// 连接关闭后丢弃它的全部序列号通道
    pub fn forget_sender(&self, sender: ConnectionId) {
        self.lanes.retain(|(owner, _), _| *owner != sender);
    }
}
