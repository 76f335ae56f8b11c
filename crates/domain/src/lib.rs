//! 聊天实时投递核心领域模型
//!
//! 包含连接、房间、消息事件与投递报告等核心类型，以及统一的错误定义。

pub mod errors;
pub mod message;
pub mod message_delivery;
pub mod session;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::*;
pub use message_delivery::*;
pub use session::*;
pub use value_objects::*;
