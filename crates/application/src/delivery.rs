//! 投递引擎
//!
//! 一次 publish：校验 -> 在 (发送者, 房间) 序列号锁内分配序列号、
//! 快照成员、逐个非阻塞入队 -> 把投递报告交给下游。
//! 单个接收方慢或已断开只影响它自己的结果。

use std::sync::Arc;
use std::time::Duration;

use config::RealtimeConfig;
use domain::{
    ConnectionId, DeliveryOutcome, DeliveryReport, MessageEvent, MessagePayload, RealtimeError,
    RecipientOutcome, RoomId,
};
use tracing::{debug, warn};

use crate::broadcaster::DeliveryReportSink;
use crate::clock::Clock;
use crate::membership::RoomMembershipIndex;
use crate::outbound::{OutboundEvent, SendStatus};
use crate::registry::ConnectionRegistry;
use crate::sequencer::MessageSequencer;

/// 等待报告下游的上限，超时只记录日志
const REPORT_SINK_TIMEOUT: Duration = Duration::from_secs(1);

pub struct DeliveryEngine {
    registry: Arc<ConnectionRegistry>,
    membership: Arc<RoomMembershipIndex>,
    sequencer: MessageSequencer,
    sink: Arc<dyn DeliveryReportSink>,
    clock: Arc<dyn Clock>,
    max_payload_bytes: usize,
}

impl DeliveryEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        membership: Arc<RoomMembershipIndex>,
        sink: Arc<dyn DeliveryReportSink>,
        clock: Arc<dyn Clock>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            registry,
            membership,
            sequencer: MessageSequencer::new(),
            sink,
            clock,
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    /// 向房间发布一条消息，返回每个接收方的投递结果
    pub async fn publish(
        &self,
        room_id: &RoomId,
        sender: ConnectionId,
        payload: MessagePayload,
    ) -> Result<DeliveryReport, RealtimeError> {
        if payload.len() > self.max_payload_bytes {
            return Err(RealtimeError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }
        if !self.membership.contains(room_id, sender) {
            return Err(RealtimeError::RoomNotJoined {
                connection_id: sender,
                room_id: room_id.clone(),
            });
        }

        let lane = self.sequencer.lane(sender, room_id);
        let report = lane.with_next(|sequence| {
            let event = Arc::new(MessageEvent::new(
                room_id.clone(),
                sender,
                payload,
                sequence,
                self.clock.now(),
            ));
            self.fan_out(event)
        });

        let summary = report.summary();
        if report.is_room_empty() {
            debug!(room_id = %room_id, sender = %sender, "published to a room with no other members");
        } else if summary.dropped_full > 0 || summary.gone > 0 {
            warn!(
                room_id = %room_id,
                sender = %sender,
                sequence = report.event.sequence,
                delivered = summary.delivered,
                queued = summary.queued,
                dropped_full = summary.dropped_full,
                gone = summary.gone,
                "message not delivered to every member"
            );
        } else {
            debug!(
                room_id = %room_id,
                sender = %sender,
                sequence = report.event.sequence,
                recipients = report.recipients.len(),
                "message fanned out"
            );
        }

        match tokio::time::timeout(REPORT_SINK_TIMEOUT, self.sink.publish(report.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(message_id = %report.event.id, error = %err, "delivery report sink failed")
            }
            Err(_) => warn!(message_id = %report.event.id, "delivery report sink timed out"),
        }

        Ok(report)
    }

    /// 对成员快照做扇出，排除发送者本身；接收方按ID排序以便报告稳定
    fn fan_out(&self, event: OutboundEvent) -> DeliveryReport {
        let mut recipients: Vec<ConnectionId> = self
            .membership
            .members_of(&event.room_id)
            .into_iter()
            .filter(|member| *member != event.sender_id)
            .collect();
        recipients.sort();

        let outcomes = recipients
            .into_iter()
            .map(|connection_id| RecipientOutcome {
                connection_id,
                outcome: self.deliver_to(connection_id, event.clone()),
            })
            .collect();

        DeliveryReport::new(event, outcomes)
    }

    fn deliver_to(&self, connection_id: ConnectionId, event: OutboundEvent) -> DeliveryOutcome {
        match self.registry.send(connection_id, event) {
            Ok(SendStatus::Delivered) => DeliveryOutcome::Delivered,
            Ok(SendStatus::Queued) => DeliveryOutcome::Queued,
            Err(RealtimeError::ChannelFull { .. }) => DeliveryOutcome::DroppedFull,
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "recipient gone");
                DeliveryOutcome::Gone
            }
        }
    }

    /// 连接关闭后清理它作为发送者的序列号状态
    pub fn forget_sender(&self, sender: ConnectionId) {
        self.sequencer.forget_sender(sender);
    }

    pub fn last_sequence(&self, sender: ConnectionId, room_id: &RoomId) -> u64 {
        self.sequencer.last_sequence(sender, room_id)
    }
}
