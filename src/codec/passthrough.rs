use super::{CodecEngine, CodecError};
use crate::config::{EncoderConfig, SAMPLE_BYTES};

/// PCM 直通引擎：把一帧采样按小端字节原样输出。
/// 未链接 libopus 时用作默认引擎，便于联调与测试。
pub struct PassthroughEngine {
    frame_bytes: usize,
    bitrate_bps: u32,
}

impl PassthroughEngine {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            frame_bytes: config.frame_samples() * config.channels as usize * SAMPLE_BYTES,
            bitrate_bps: config.bitrate_kbps * 1000,
        }
    }

    /// 当前记录的目标码率（直通引擎不使用）
    pub fn bitrate_bps(&self) -> u32 {
        self.bitrate_bps
    }
}

impl CodecEngine for PassthroughEngine {
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError> {
        let needed = pcm.len() * SAMPLE_BYTES;
        if needed > out.len() {
            return Err(CodecError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }

        for (chunk, sample) in out.chunks_exact_mut(SAMPLE_BYTES).zip(pcm) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        Ok(needed)
    }

    fn set_bitrate(&mut self, bits_per_second: u32) -> Result<(), CodecError> {
        self.bitrate_bps = bits_per_second;
        Ok(())
    }

    fn max_packet_size(&self) -> usize {
        self.frame_bytes
    }

    fn name(&self) -> &'static str {
        "pcm-passthrough"
    }
}
