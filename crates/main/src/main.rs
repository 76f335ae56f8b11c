//! 主应用程序入口
//!
//! 加载配置，组装实时核心，启动 Axum WebSocket 服务。

use std::sync::Arc;

use application::{LocalReportBroadcaster, RealtimeCore, ReportStream};
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        channel_capacity = config.realtime.channel_capacity,
        overflow_policy = ?config.realtime.overflow_policy,
        max_payload_bytes = config.realtime.max_payload_bytes,
        "配置加载完成"
    );

    let reports = LocalReportBroadcaster::new(config.realtime.report_capacity);
    tokio::spawn(log_reports(reports.subscribe()));

    let core = RealtimeCore::new(&config.realtime, Arc::new(reports));
    let state = AppState::new(core, config.realtime.clone());
    let app = router(state, &config.server.cors_origins);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("聊天服务器启动在 http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

/// 持久化写入器接入之前，先把投递报告落到日志里
async fn log_reports(mut stream: ReportStream) {
    while let Some(report) = stream.recv().await {
        let summary = report.summary();
        tracing::debug!(
            message_id = %report.event.id,
            room_id = %report.event.room_id,
            sender = %report.event.sender_id,
            sequence = report.event.sequence,
            delivered = summary.delivered,
            queued = summary.queued,
            dropped_full = summary.dropped_full,
            gone = summary.gone,
            "投递报告"
        );
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到关闭信号");
}
