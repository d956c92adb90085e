//! 错误类型定义
//!
//! 所有公开操作都通过返回值报告错误，从不经由回调通道。
//! C 接口使用 [`EncoderError::code`] 给出的负数错误码。

use crate::codec::CodecError;
use crate::session::SessionState;
use thiserror::Error;

/// 编码会话错误类型
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("内存分配失败: 需要{requested}个采样")]
    AllocationFailure { requested: usize },

    #[error("无效配置: {0}")]
    InvalidConfig(String),

    #[error("无效码率: {kbps} kbps (支持范围 {min}-{max} kbps)")]
    InvalidBitrate { kbps: u32, min: u32, max: u32 },

    #[error("无效参数: {0}")]
    InvalidArgument(&'static str),

    #[error("状态错误: 当前状态{state:?}下不能执行{operation}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("音频数据未按采样对齐: {len}字节，采样宽度{width}字节")]
    MalformedInput { len: usize, width: usize },

    #[error("编码器初始化失败: {0}")]
    CodecInitFailure(#[source] CodecError),

    #[error("帧编码失败 (本次已编码{encoded}帧): {source}")]
    EncodeFailure {
        encoded: usize,
        #[source]
        source: CodecError,
    },
}

impl EncoderError {
    /// C 接口错误码（始终为负数）
    pub fn code(&self) -> i32 {
        match self {
            EncoderError::AllocationFailure { .. } => -1,
            EncoderError::InvalidConfig(_) => -2,
            EncoderError::InvalidBitrate { .. } => -3,
            EncoderError::InvalidArgument(_) => -4,
            EncoderError::InvalidState { .. } => -5,
            EncoderError::MalformedInput { .. } => -6,
            EncoderError::CodecInitFailure(_) => -7,
            EncoderError::EncodeFailure { .. } => -8,
        }
    }
}

/// 编码会话结果类型
pub type EncoderResult<T> = Result<T, EncoderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_negative_and_distinct() {
        let errors = [
            EncoderError::AllocationFailure { requested: 960 },
            EncoderError::InvalidConfig("x".to_string()),
            EncoderError::InvalidBitrate { kbps: 1, min: 6, max: 510 },
            EncoderError::InvalidArgument("x"),
            EncoderError::InvalidState {
                operation: "encode",
                state: SessionState::Uninitialized,
            },
            EncoderError::MalformedInput { len: 3, width: 2 },
            EncoderError::CodecInitFailure(CodecError::Rejected("x".to_string())),
            EncoderError::EncodeFailure {
                encoded: 0,
                source: CodecError::Rejected("x".to_string()),
            },
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
