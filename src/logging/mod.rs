//! 日志初始化与操作计时
//!
//! 库本身只通过 `tracing` 宏输出事件；是否安装订阅者由应用决定。

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt};

use crate::config::Stage;

/// 覆盖日志过滤规则的环境变量，语法同 `RUST_LOG`
pub const ENV_LOG: &str = "BINDERY_LOG";

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 未设置 `BINDERY_LOG` 时的默认级别
    pub level: Level,
    pub format: LogFormat,
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_stage(Stage::default())
    }
}

impl LoggingConfig {
    /// 与注入器阶段对应的预设
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Tool => Self {
                level: Level::WARN,
                format: LogFormat::Compact,
                show_target: false,
                show_thread_ids: false,
                ansi: true,
            },
            Stage::Development => Self {
                level: Level::DEBUG,
                format: LogFormat::Pretty,
                show_target: true,
                show_thread_ids: true,
                ansi: true,
            },
            Stage::Production => Self {
                level: Level::INFO,
                format: LogFormat::Compact,
                show_target: false,
                show_thread_ids: false,
                ansi: false,
            },
        }
    }

    pub fn testing() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::for_stage(Stage::Tool)
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .with_env_var(ENV_LOG)
            .from_env_lossy()
    }
}

/// 安装全局订阅者；已安装时返回错误
pub fn init_logging(config: LoggingConfig) -> Result<(), TryInitError> {
    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(config.ansi);
            tracing_subscriber::registry()
                .with(config.filter())
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(config.ansi);
            tracing_subscriber::registry()
                .with(config.filter())
                .with(fmt_layer)
                .try_init()?;
        }
    }

    tracing::debug!(level = %config.level, format = ?config.format, "bindery logging installed");
    Ok(())
}

/// 操作计时器
///
/// `finish` 记录一次完成事件；未完成就被丢弃的计时器记录为中断。
pub struct OperationTimer {
    start: Instant,
    operation: String,
    metadata: BTreeMap<String, String>,
    finished: bool,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
            metadata: BTreeMap::new(),
            finished: false,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn finish(mut self) {
        self.finished = true;
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_us = duration.as_micros() as u64,
            metadata = ?self.metadata,
            "Operation completed"
        );
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!(
            operation = %self.operation,
            duration_us = self.start.elapsed().as_micros() as u64,
            metadata = ?self.metadata,
            "Operation aborted"
        );
    }
}
