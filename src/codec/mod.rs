//! 编码引擎抽象
//!
//! 会话只通过 [`CodecEngine`] 与第三方编码器交互。
//! 启用 `opus` 特性时默认引擎为 libopus，否则为 PCM 直通引擎。

#[cfg(feature = "opus")]
mod libopus;
mod passthrough;

#[cfg(feature = "opus")]
pub use libopus::OpusEngine;
pub use passthrough::PassthroughEngine;

use crate::config::{EncoderConfig, MAX_PACKET_SIZE};
use thiserror::Error;

/// 编码引擎错误类型
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("编码器拒绝请求: {0}")]
    Rejected(String),

    #[error("输出缓冲区不足: 需要{needed}字节，可用{available}字节")]
    BufferTooSmall { needed: usize, available: usize },

    #[cfg(feature = "opus")]
    #[error("libopus错误 {code}: {message}")]
    Opus { code: i32, message: String },
}

/// 第三方编码引擎接口
pub trait CodecEngine {
    /// 编码一帧交织PCM，返回写入 `out` 的字节数
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError>;

    /// 修改目标码率，从下一帧开始生效
    fn set_bitrate(&mut self, bits_per_second: u32) -> Result<(), CodecError>;

    /// 单个编码包的最大字节数
    fn max_packet_size(&self) -> usize {
        MAX_PACKET_SIZE
    }

    /// 是否能在静音段停止输出（DTX）
    fn supports_dtx(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// 引擎构造函数，`init` 时按配置调用
pub type EngineFactory = Box<dyn Fn(&EncoderConfig) -> Result<Box<dyn CodecEngine>, CodecError>>;

/// 按编译特性选择默认引擎
pub fn default_engine(config: &EncoderConfig) -> Result<Box<dyn CodecEngine>, CodecError> {
    #[cfg(feature = "opus")]
    {
        Ok(Box::new(OpusEngine::new(config)?))
    }
    #[cfg(not(feature = "opus"))]
    {
        Ok(Box::new(PassthroughEngine::new(config)))
    }
}
