//! Web API 层。
//!
//! 提供 Axum 路由：`/ws` 把 WebSocket 连接接入实时核心，`/health` 返回存活状态。

mod protocol;
mod routes;
mod state;
mod ws_connection;

pub use protocol::{ChatRef, ClientEvent, ServerEvent};
pub use routes::{router, HealthBody};
pub use state::AppState;
pub use ws_connection::{InboundHandler, WebSocketConnection};
