//! 应用层实现。
//!
//! 连接注册表、房间成员索引、投递引擎和会话生命周期管理，
//! 以及对外部协作者（投递报告下游、时钟）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod delivery;
pub mod local_broadcast;
pub mod membership;
pub mod outbound;
pub mod registry;
pub mod sequencer;
pub mod session;

pub use broadcaster::{BroadcastError, DeliveryReportSink, DiscardReports};
#[cfg(any(test, feature = "testing"))]
pub use broadcaster::MockDeliveryReportSink;
pub use clock::{Clock, FixedClock, SystemClock};
pub use delivery::DeliveryEngine;
pub use local_broadcast::{LocalReportBroadcaster, ReportStream};
pub use membership::RoomMembershipIndex;
pub use outbound::{EnqueueError, OutboundEvent, OutboundReceiver, OutboundSender, SendStatus};
pub use registry::ConnectionRegistry;
pub use sequencer::{MessageSequencer, SequenceLane};
pub use session::SessionLifecycleManager;

use std::sync::Arc;

use config::RealtimeConfig;

/// 组装好的实时核心，各组件通过 `Arc` 共享
#[derive(Clone)]
pub struct RealtimeCore {
    pub registry: Arc<ConnectionRegistry>,
    pub membership: Arc<RoomMembershipIndex>,
    pub engine: Arc<DeliveryEngine>,
    pub sessions: Arc<SessionLifecycleManager>,
}

impl RealtimeCore {
    pub fn new(config: &RealtimeConfig, sink: Arc<dyn DeliveryReportSink>) -> Self {
        Self::with_clock(config, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &RealtimeConfig,
        sink: Arc<dyn DeliveryReportSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::from_config(config));
        let membership = Arc::new(RoomMembershipIndex::new());
        let engine = Arc::new(DeliveryEngine::new(
            registry.clone(),
            membership.clone(),
            sink,
            clock,
            config,
        ));
        let sessions = Arc::new(SessionLifecycleManager::new(
            registry.clone(),
            membership.clone(),
            engine.clone(),
        ));
        Self {
            registry,
            membership,
            engine,
            sessions,
        }
    }
}
