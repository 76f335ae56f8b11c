// 简单的本地投递报告广播器
use crate::broadcaster::{BroadcastError, DeliveryReportSink};
use async_trait::async_trait;
use domain::{DeliveryReport, RoomId};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct LocalReportBroadcaster {
    sender: broadcast::Sender<DeliveryReport>,
}

impl LocalReportBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 订阅全部房间的报告
    pub fn subscribe(&self) -> ReportStream {
        ReportStream::new(self.sender.subscribe(), None)
    }

    /// 只订阅某个房间的报告
    pub fn subscribe_room(&self, room_id: RoomId) -> ReportStream {
        ReportStream::new(self.sender.subscribe(), Some(room_id))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalReportBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl DeliveryReportSink for LocalReportBroadcaster {
    async fn publish(&self, report: DeliveryReport) -> Result<(), BroadcastError> {
        // 没有订阅者不算失败
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(report)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        Ok(())
    }
}

// 报告流：落后时跳过并记录，而不是结束
pub struct ReportStream {
    receiver: broadcast::Receiver<DeliveryReport>,
    room_id: Option<RoomId>,
}

impl ReportStream {
    pub fn new(receiver: broadcast::Receiver<DeliveryReport>, room_id: Option<RoomId>) -> Self {
        Self { receiver, room_id }
    }

    pub async fn recv(&mut self) -> Option<DeliveryReport> {
        loop {
            match self.receiver.recv().await {
                Ok(report) => {
                    let wanted = self
                        .room_id
                        .as_ref()
                        .map_or(true, |room| *room == report.event.room_id);
                    if wanted {
                        return Some(report);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "delivery report stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ConnectionId, MessageEvent, MessagePayload};
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn report(room: &str) -> DeliveryReport {
        DeliveryReport::new(
            Arc::new(MessageEvent::new(
                RoomId::parse(room).unwrap(),
                ConnectionId::random(),
                MessagePayload::text("hi"),
                1,
                OffsetDateTime::now_utc(),
            )),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let broadcaster = LocalReportBroadcaster::new(4);
        assert!(broadcaster.publish(report("r1")).await.is_ok());
    }

    #[tokio::test]
    async fn room_stream_filters_other_rooms() {
        let broadcaster = LocalReportBroadcaster::new(4);
        let mut stream = broadcaster.subscribe_room(RoomId::parse("r2").unwrap());

        broadcaster.publish(report("r1")).await.unwrap();
        broadcaster.publish(report("r2")).await.unwrap();

        let received = stream.recv().await.unwrap();
        assert_eq!(received.event.room_id.as_str(), "r2");
    }
}
