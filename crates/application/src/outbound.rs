//! 连接出站队列
//!
//! 有界、有序、单消费者。`tokio::sync::mpsc` 无法在发送端丢弃队头，
//! 所以这里用 `VecDeque` + `Notify` 自行实现，以支持 drop-oldest 策略。
//! 发送端永远不会等待。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use config::OverflowPolicy;
use domain::MessageEvent;
use tokio::sync::Notify;

/// 出站事件，在所有接收方之间共享同一份消息
pub type OutboundEvent = Arc<MessageEvent>;

/// 入队成功时的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// 队列此前为空
    Delivered,
    /// 排在已有积压之后，或挤掉了最旧的一条
    Queued,
}

/// 入队失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    buffer: VecDeque<OutboundEvent>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            drop(state);
            self.notify.notify_one();
        }
    }
}

/// 创建一对出站队列端点
pub fn channel(capacity: usize, policy: OverflowPolicy) -> (OutboundSender, OutboundReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState::default()),
        notify: Notify::new(),
        capacity: capacity.max(1),
        policy,
    });
    (
        OutboundSender {
            shared: shared.clone(),
        },
        OutboundReceiver { shared },
    )
}

/// 出站队列发送端，由连接注册表持有
#[derive(Debug, Clone)]
pub struct OutboundSender {
    shared: Arc<Shared>,
}

impl OutboundSender {
    /// 非阻塞入队
    pub fn try_send(&self, event: OutboundEvent) -> Result<SendStatus, EnqueueError> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(EnqueueError::Closed);
        }

        let status = if state.buffer.len() < self.shared.capacity {
            if state.buffer.is_empty() {
                SendStatus::Delivered
            } else {
                SendStatus::Queued
            }
        } else {
            match self.shared.policy {
                OverflowPolicy::RejectNew => return Err(EnqueueError::Full),
                OverflowPolicy::DropOldest => {
                    state.buffer.pop_front();
                    state.dropped += 1;
                    SendStatus::Queued
                }
            }
        };

        state.buffer.push_back(event);
        drop(state);
        self.shared.notify.notify_one();
        Ok(status)
    }

    /// 关闭队列；接收端取完剩余事件后得到 `None`
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// 当前积压条数
    pub fn backlog(&self) -> usize {
        self.shared.lock().buffer.len()
    }
}

/// 出站队列接收端，交给传输层的写任务
#[derive(Debug)]
pub struct OutboundReceiver {
    shared: Arc<Shared>,
}

impl OutboundReceiver {
    /// 等待下一条事件；队列关闭且取空后返回 `None`
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(event) = state.buffer.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// 非阻塞取一条
    pub fn try_recv(&mut self) -> Option<OutboundEvent> {
        self.shared.lock().buffer.pop_front()
    }

    /// drop-oldest 策略下累计被挤掉的事件数
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl Drop for OutboundReceiver {
    fn drop(&mut self) {
        // 写任务退出后，后续发送直接视为连接已断开
        self.shared.close();
    }
}
