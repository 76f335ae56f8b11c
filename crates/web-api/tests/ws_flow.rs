mod support;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use application::{BroadcastError, DeliveryReportSink};
use async_trait::async_trait;
use config::RealtimeConfig;
use domain::{DeliveryReport, RoomId};
use serde_json::json;
use tokio::time::sleep;

use support::{expect_silence, next_json, send_json, TestServer};

async fn join(client: &mut support::Client, chat_id: &str) {
    send_json(client, json!({ "event": "joinChat", "data": { "chatId": chat_id } })).await;
    let reply = next_json(client).await;
    assert_eq!(reply["event"], "joinedChat");
    assert_eq!(reply["data"]["chatId"], chat_id);
}

#[tokio::test]
async fn websocket_relay_flow() {
    let server = TestServer::start(RealtimeConfig::default()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    let mut c = server.connect().await;

    join(&mut a, "r1").await;
    join(&mut b, "r1").await;
    join(&mut c, "r1").await;

    send_json(
        &mut a,
        json!({ "event": "sendMessage", "data": { "chatId": "r1", "content": "hi", "type": "text" } }),
    )
    .await;

    let ack = next_json(&mut a).await;
    assert_eq!(ack["event"], "messageAck");
    assert_eq!(ack["data"]["sequence"], 1);
    assert_eq!(ack["data"]["delivered"].as_u64().unwrap() + ack["data"]["queued"].as_u64().unwrap(), 2);

    for client in [&mut b, &mut c] {
        let frame = next_json(client).await;
        assert_eq!(frame["event"], "receiveMessage");
        assert_eq!(frame["data"]["chatId"], "r1");
        assert_eq!(frame["data"]["payload"], "hi");
        assert_eq!(frame["data"]["type"], "text");
        assert_eq!(frame["data"]["messageId"], ack["data"]["messageId"]);
    }

    // 发送者收不到自己的消息
    expect_silence(&mut a, Duration::from_millis(200)).await;
}

/// 模拟较慢的持久化写入
#[derive(Default)]
struct SlowSink {
    persisted: AtomicUsize,
}

#[async_trait]
impl DeliveryReportSink for SlowSink {
    async fn publish(&self, _report: DeliveryReport) -> Result<(), BroadcastError> {
        sleep(Duration::from_millis(300)).await;
        self.persisted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn sender_disconnect_does_not_cut_report_persistence() {
    let sink = Arc::new(SlowSink::default());
    let server = TestServer::start_with_sink(RealtimeConfig::default(), sink.clone()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    join(&mut a, "r1").await;
    join(&mut b, "r1").await;

    send_json(
        &mut a,
        json!({ "event": "sendMessage", "data": { "chatId": "r1", "payload": "hi" } }),
    )
    .await;
    let frame = next_json(&mut b).await;
    assert_eq!(frame["data"]["payload"], "hi");

    // 报告还在写入时断开发送者
    a.close(None).await.expect("close");
    drop(a);
    sleep(Duration::from_millis(800)).await;

    assert_eq!(sink.persisted.load(Ordering::SeqCst), 1);
    assert_eq!(server.state.core.sessions.session_count(), 1);
}

#[tokio::test]
async fn join_accepts_bare_chat_id() {
    let server = TestServer::start(RealtimeConfig::default()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    send_json(&mut a, json!({ "event": "joinChat", "data": "r1" })).await;
    let reply = next_json(&mut a).await;
    assert_eq!(reply["event"], "joinedChat");
    assert_eq!(reply["data"]["chatId"], "r1");
    join(&mut b, "r1").await;

    send_json(
        &mut b,
        json!({ "event": "sendMessage", "data": { "chatId": "r1", "content": "yo" } }),
    )
    .await;
    let frame = next_json(&mut a).await;
    assert_eq!(frame["event"], "receiveMessage");
    assert_eq!(frame["data"]["payload"], "yo");
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let server = TestServer::start(RealtimeConfig::default()).await;
    let mut a = server.connect().await;

    send_json(&mut a, json!({ "event": "typing" })).await;
    let reply = next_json(&mut a).await;
    assert_eq!(reply["event"], "error");
    assert_eq!(reply["data"]["code"], "BAD_FRAME");

    join(&mut a, "r1").await;
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let realtime = RealtimeConfig {
        max_payload_bytes: 8,
        ..RealtimeConfig::default()
    };
    let server = TestServer::start(realtime).await;
    let mut a = server.connect().await;
    join(&mut a, "r1").await;

    send_json(
        &mut a,
        json!({ "event": "sendMessage", "data": { "chatId": "r1", "payload": "way too long" } }),
    )
    .await;
    let reply = next_json(&mut a).await;
    assert_eq!(reply["event"], "error");
    assert_eq!(reply["data"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn disconnect_cleans_up_membership() {
    let server = TestServer::start(RealtimeConfig::default()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    join(&mut a, "r1").await;
    join(&mut b, "r1").await;
    assert_eq!(server.state.core.membership.member_count(&RoomId::parse("r1").unwrap()), 2);

    a.close(None).await.expect("close");
    drop(a);
    sleep(Duration::from_millis(200)).await;

    assert_eq!(server.state.core.membership.member_count(&RoomId::parse("r1").unwrap()), 1);
    assert_eq!(server.state.core.sessions.session_count(), 1);

    send_json(
        &mut b,
        json!({ "event": "sendMessage", "data": { "chatId": "r1", "payload": "anyone?" } }),
    )
    .await;
    let ack = next_json(&mut b).await;
    assert_eq!(ack["event"], "messageAck");
    assert_eq!(ack["data"]["delivered"], 0);
    assert_eq!(ack["data"]["gone"], 0);
}

#[tokio::test]
async fn health_reports_counters() {
    let server = TestServer::start(RealtimeConfig::default()).await;
    let mut a = server.connect().await;
    join(&mut a, "lobby").await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health json");

    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["rooms"], 1);
}
