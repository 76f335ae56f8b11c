//! 统一配置中心
//!
//! 提供实时投递服务的配置管理，包括：
//! - 监听地址与 CORS
//! - 出站队列容量与溢出策略
//! - 消息体上限
//!
//! 加载优先级：默认值 -> 可选配置文件（`HAWKY_CONFIG_FILE`）-> 环境变量（`HAWKY_*`，
//! 用 `__` 表示嵌套）-> `PORT`。

use std::path::Path;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 指定配置文件路径的环境变量
pub const CONFIG_FILE_ENV: &str = "HAWKY_CONFIG_FILE";
/// 环境变量前缀
pub const ENV_PREFIX: &str = "HAWKY_";

/// 出站队列写满时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 拒绝新消息，接收方结果记为 dropped_full
    #[default]
    RejectNew,
    /// 丢弃最旧的一条，为新消息腾出位置
    DropOldest,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// 实时投递配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RealtimeConfig {
    /// 每个连接的出站队列容量
    #[validate(range(min = 1))]
    pub channel_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[validate(range(min = 1))]
    pub max_payload_bytes: usize,
    /// 每个连接入站事件队列容量
    #[validate(range(min = 1))]
    pub inbound_queue_capacity: usize,
    /// 投递报告广播容量
    #[validate(range(min = 1))]
    pub report_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            overflow_policy: OverflowPolicy::RejectNew,
            max_payload_bytes: 64 * 1024,
            inbound_queue_capacity: 64,
            report_capacity: 1024,
        }
    }
}

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub realtime: RealtimeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 5000,
                cors_origins: vec!["*".into()],
            },
            realtime: RealtimeConfig::default(),
        }
    }
}

impl AppConfig {
    /// 按优先级加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            fig = merge_file(fig, &path);
        }
        fig = fig
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()));

        let cfg: AppConfig = fig.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn merge_file(fig: Figment, path: &str) -> Figment {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "yml" | "yaml" => fig.merge(Yaml::file(path)),
        "json" => fig.merge(Json::file(path)),
        _ => fig.merge(Toml::file(path)),
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
