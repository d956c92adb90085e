//! Opus 编码会话 - 把任意长度的PCM块组装为定长帧并驱动编码器

/// 错误类型
pub mod error;

/// 编码器配置与能力
pub mod config;

/// 编码引擎抽象
pub mod codec;

/// 帧缓冲池与帧组装
pub mod frame;

/// 编码包与日志回调
pub mod sink;

/// 编码会话
pub mod session;

/// C 接口
pub mod capi;

/// 重新导出常用类型
pub use error::{EncoderError, EncoderResult};
pub use config::{EncoderConfig, FrameDuration};
pub use codec::{CodecEngine, CodecError, EngineFactory};
pub use frame::{AudioFrame, FrameAssembler, FrameBufferPool, FrameId, PoolStats};
pub use sink::{EncodedPacket, FrameSink, LogSink};
pub use session::{EncoderSession, SessionState};

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 日志系统
pub mod logging;
