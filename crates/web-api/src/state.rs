use std::sync::Arc;

use application::RealtimeCore;
use config::RealtimeConfig;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct AppState {
    pub core: RealtimeCore,
    pub realtime: Arc<RealtimeConfig>,
    pub started_at: OffsetDateTime,
}

impl AppState {
    pub fn new(core: RealtimeCore, realtime: RealtimeConfig) -> Self {
        Self {
            core,
            realtime: Arc::new(realtime),
            started_at: OffsetDateTime::now_utc(),
        }
    }
}
