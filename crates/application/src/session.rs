//! 会话生命周期管理
//!
//! 每个连接一个状态机：CONNECTING -> OPEN -> CLOSING -> CLOSED。
//! join / leave / publish 只在 OPEN 状态下执行，并持有在途计数；
//! close 通过 CAS 保证只有一个调用方执行清理，且等在途操作全部结束后再清理。

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{ConnectionId, DeliveryReport, MessagePayload, RealtimeError, RoomId, SessionState};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::delivery::DeliveryEngine;
use crate::membership::RoomMembershipIndex;
use crate::outbound::OutboundReceiver;
use crate::registry::ConnectionRegistry;

#[derive(Debug)]
struct SessionSlot {
    state: AtomicU8,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Connecting.as_u8()),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// 在途操作守卫，析构时递减计数并唤醒等待中的 close
struct InFlight {
    slot: Arc<SessionSlot>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.slot.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.slot.drained.notify_waiters();
        }
    }
}

pub struct SessionLifecycleManager {
    sessions: DashMap<ConnectionId, Arc<SessionSlot>>,
    registry: Arc<ConnectionRegistry>,
    membership: Arc<RoomMembershipIndex>,
    engine: Arc<DeliveryEngine>,
}

impl SessionLifecycleManager {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        membership: Arc<RoomMembershipIndex>,
        engine: Arc<DeliveryEngine>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            registry,
            membership,
            engine,
        }
    }

    /// 打开会话：CONNECTING -> 注册 -> OPEN
    ///
    /// 注册期间若被 close 抢先，本次打开失败并立即回收注册。
    pub fn open(&self, connection_id: ConnectionId) -> Result<OutboundReceiver, RealtimeError> {
        let slot = self.begin_open(connection_id)?;
        self.finish_open(connection_id, slot)
    }

    fn begin_open(&self, connection_id: ConnectionId) -> Result<Arc<SessionSlot>, RealtimeError> {
        match self.sessions.entry(connection_id) {
            Entry::Occupied(_) => Err(RealtimeError::DuplicateConnection(connection_id)),
            Entry::Vacant(vacant) => Ok(vacant.insert(Arc::new(SessionSlot::new())).clone()),
        }
    }

    fn finish_open(
        &self,
        connection_id: ConnectionId,
        slot: Arc<SessionSlot>,
    ) -> Result<OutboundReceiver, RealtimeError> {
        let receiver = match self.registry.register(connection_id) {
            Ok(receiver) => receiver,
            Err(err) => {
                self.sessions.remove(&connection_id);
                return Err(err);
            }
        };

        if !slot.transition(SessionState::Connecting, SessionState::Open) {
            // CONNECTING 期间收到了 close，由这里完成清理
            self.registry.deregister(connection_id);
            slot.set(SessionState::Closed);
            self.sessions.remove(&connection_id);
            info!(connection_id = %connection_id, "session closed before it opened");
            return Err(RealtimeError::invalid_state(connection_id, SessionState::Closing));
        }

        info!(connection_id = %connection_id, "session opened");
        Ok(receiver)
    }

    fn enter(&self, connection_id: ConnectionId) -> Result<InFlight, RealtimeError> {
        let slot = self
            .sessions
            .get(&connection_id)
            .map(|slot| slot.clone())
            .ok_or_else(|| RealtimeError::invalid_state(connection_id, SessionState::Closed))?;

        // 先计数再检查状态，close 一旦看到计数归零就不会再有新操作进来
        slot.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight { slot };
        let state = guard.slot.state();
        if state.accepts_operations() {
            Ok(guard)
        } else {
            Err(RealtimeError::invalid_state(connection_id, state))
        }
    }

    /// 加入房间；返回是否为新加入
    pub fn join(&self, connection_id: ConnectionId, room_id: &RoomId) -> Result<bool, RealtimeError> {
        let _guard = self.enter(connection_id)?;
        self.registry.record_join(connection_id, room_id.clone())?;
        let added = self.membership.join(room_id, connection_id);
        if added {
            info!(connection_id = %connection_id, room_id = %room_id, "joined room");
        }
        Ok(added)
    }

    /// 离开房间；未加入时为空操作
    pub fn leave(&self, connection_id: ConnectionId, room_id: &RoomId) -> Result<bool, RealtimeError> {
        let _guard = self.enter(connection_id)?;
        self.registry.record_leave(connection_id, room_id);
        let removed = self.membership.leave(room_id, connection_id);
        if removed {
            info!(connection_id = %connection_id, room_id = %room_id, "left room");
        }
        Ok(removed)
    }

    pub async fn publish(
        &self,
        connection_id: ConnectionId,
        room_id: &RoomId,
        payload: MessagePayload,
    ) -> Result<DeliveryReport, RealtimeError> {
        let _guard = self.enter(connection_id)?;
        self.engine.publish(room_id, connection_id, payload).await
    }

    /// 关闭会话；只有赢得关闭权的调用方得到 `true`
    ///
    /// 会话仍在 CONNECTING 时只标记为 CLOSING，清理交给 `open` 完成。
    pub async fn close(&self, connection_id: ConnectionId) -> bool {
        let Some(slot) = self.sessions.get(&connection_id).map(|slot| slot.clone()) else {
            return false;
        };
        if slot.transition(SessionState::Connecting, SessionState::Closing) {
            debug!(connection_id = %connection_id, "close requested while connecting");
            return true;
        }
        if !slot.transition(SessionState::Open, SessionState::Closing) {
            debug!(connection_id = %connection_id, state = %slot.state(), "close already in progress");
            return false;
        }

        loop {
            // notify_waiters 只唤醒已创建的 Notified，所以先创建再检查计数
            let drained = slot.drained.notified();
            if slot.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            drained.await;
        }

        let mut rooms = self.registry.joined_rooms(connection_id);
        for room_id in &rooms {
            self.membership.leave(room_id, connection_id);
        }
        rooms.extend(self.registry.deregister(connection_id));
        self.engine.forget_sender(connection_id);

        slot.set(SessionState::Closed);
        self.sessions.remove(&connection_id);
        info!(connection_id = %connection_id, rooms = rooms.len(), "session closed");
        true
    }

    /// 未知或已清理的连接视为 CLOSED
    pub fn state(&self, connection_id: ConnectionId) -> SessionState {
        self.sessions
            .get(&connection_id)
            .map(|slot| slot.state())
            .unwrap_or(SessionState::Closed)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
