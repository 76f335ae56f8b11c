use async_trait::async_trait;
use domain::DeliveryReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 投递报告的下游（例如持久化日志写入器）
///
/// 失败只会被记录日志，不会影响 publish 的结果。
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryReportSink: Send + Sync {
    async fn publish(&self, report: DeliveryReport) -> Result<(), BroadcastError>;
}

/// 丢弃所有报告
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardReports;

#[async_trait]
impl DeliveryReportSink for DiscardReports {
    async fn publish(&self, _report: DeliveryReport) -> Result<(), BroadcastError> {
        Ok(())
    }
}
