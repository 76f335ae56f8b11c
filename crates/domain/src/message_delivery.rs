use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::MessageEvent;
use crate::value_objects::ConnectionId;

/// 单个接收方的投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// 已入队，且队列此前没有积压
    Delivered,
    /// 已入队，但排在积压之后（慢接收方）
    Queued,
    /// 队列已满，本条消息被丢弃
    DroppedFull,
    /// 接收方已断开
    Gone,
}

impl DeliveryOutcome {
    /// 消息是否进入了接收方的出站队列
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Delivered | Self::Queued)
    }
}

/// 接收方 + 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    pub connection_id: ConnectionId,
    pub outcome: DeliveryOutcome,
}

/// 各类结果的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub queued: usize,
    pub dropped_full: usize,
    pub gone: usize,
}

/// 一次 publish 的投递报告
///
/// 持久化等外部协作者可以订阅报告流，把 `event` 追加到持久日志中。
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub event: Arc<MessageEvent>,
    pub recipients: Vec<RecipientOutcome>,
}

impl DeliveryReport {
    pub fn new(event: Arc<MessageEvent>, recipients: Vec<RecipientOutcome>) -> Self {
        Self { event, recipients }
    }

    /// 房间内除发送者外没有任何成员（提示信息，不是错误）
    pub fn is_room_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn outcome_for(&self, connection_id: ConnectionId) -> Option<DeliveryOutcome> {
        self.recipients
            .iter()
            .find(|r| r.connection_id == connection_id)
            .map(|r| r.outcome)
    }

    pub fn summary(&self) -> DeliverySummary {
        let mut summary = DeliverySummary::default();
        for recipient in &self.recipients {
            match recipient.outcome {
                DeliveryOutcome::Delivered => summary.delivered += 1,
                DeliveryOutcome::Queued => summary.queued += 1,
                DeliveryOutcome::DroppedFull => summary.dropped_full += 1,
                DeliveryOutcome::Gone => summary.gone += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessagePayload, RoomId};
    use time::OffsetDateTime;

    #[test]
    fn summary_counts_each_outcome() {
        let event = Arc::new(MessageEvent::new(
            RoomId::parse("r1").unwrap(),
            ConnectionId::random(),
            MessagePayload::text("hi"),
            1,
            OffsetDateTime::now_utc(),
        ));
        let a = ConnectionId::random();
        let report = DeliveryReport::new(
            event,
            vec![
                RecipientOutcome {
                    connection_id: a,
                    outcome: DeliveryOutcome::Delivered,
                },
                RecipientOutcome {
                    connection_id: ConnectionId::random(),
                    outcome: DeliveryOutcome::DroppedFull,
                },
                RecipientOutcome {
                    connection_id: ConnectionId::random(),
                    outcome: DeliveryOutcome::Gone,
                },
            ],
        );

        let summary = report.summary();
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.dropped_full, 1);
        assert_eq!(summary.gone, 1);
        assert_eq!(summary.queued, 0);
        assert_eq!(report.outcome_for(a), Some(DeliveryOutcome::Delivered));
        assert!(!report.is_room_empty());
    }
}
