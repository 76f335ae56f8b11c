use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{DeliveryReportSink, DiscardReports, RealtimeCore};
use config::RealtimeConfig;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::sleep};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(realtime: RealtimeConfig) -> Self {
        Self::start_with_sink(realtime, Arc::new(DiscardReports)).await
    }

    pub async fn start_with_sink(realtime: RealtimeConfig, sink: Arc<dyn DeliveryReportSink>) -> Self {
        let core = RealtimeCore::new(&realtime, sink);
        let state = AppState::new(core, realtime);
        let app = router(state.clone(), &["*".to_string()]);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // allow server to start
        sleep(Duration::from_millis(100)).await;

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn connect(&self) -> Client {
        let (socket, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("connect websocket");
        socket
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_json(client: &mut Client, value: Value) {
    client
        .send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一个文本帧，超时则失败
pub async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

/// 在给定时间内没有任何文本帧到达
pub async fn expect_silence(client: &mut Client, window: Duration) {
    if let Ok(Some(Ok(TungsteniteMessage::Text(text)))) =
        tokio::time::timeout(window, client.next()).await
    {
        panic!("unexpected frame: {}", text.as_str());
    }
}
