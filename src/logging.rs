use log::Level;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

/// 初始化 tracing 日志系统（控制台输出）
///
/// 过滤规则读取 `RUST_LOG`，默认 `info`。重复调用不会覆盖已有的订阅者。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if fmt().with_env_filter(filter).try_init().is_ok() {
        info!("日志系统初始化完成");
    }
}

/// 把发往日志回调的事件同步写入 tracing
pub(crate) fn mirror(level: Level, session: &Uuid, message: &str) {
    match level {
        Level::Error => error!(%session, "{}", message),
        Level::Warn => warn!(%session, "{}", message),
        Level::Info => info!(%session, "{}", message),
        Level::Debug => debug!(%session, "{}", message),
        Level::Trace => trace!(%session, "{}", message),
    }
}
