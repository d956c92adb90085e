//! 帧管理模块 - 帧缓冲池与帧组装

/// 帧缓冲池实现
pub mod pool;

/// 帧组装器实现
pub mod assembler;

// 重新导出公共类型
pub use pool::{AudioFrame, FrameBufferPool, FrameId, PoolStats};
pub use assembler::FrameAssembler;
