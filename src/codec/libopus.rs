use super::{CodecEngine, CodecError};
use crate::config::EncoderConfig;
use audiopus_sys as ffi;
use libc::c_int;
use std::ffi::CStr;
use std::ptr::NonNull;
use tracing::debug;

// opus_defines.h
const OPUS_OK: c_int = 0;
const OPUS_APPLICATION_VOIP: c_int = 2048;
const OPUS_SET_BITRATE_REQUEST: c_int = 4002;
const OPUS_SET_VBR_REQUEST: c_int = 4006;
const OPUS_SET_INBAND_FEC_REQUEST: c_int = 4012;
const OPUS_SET_PACKET_LOSS_PERC_REQUEST: c_int = 4014;
const OPUS_SET_DTX_REQUEST: c_int = 4016;
const OPUS_GET_DTX_REQUEST: c_int = 4017;

/// 预期丢包率（百分比），用于带内FEC冗余量
const EXPECTED_PACKET_LOSS_PERC: c_int = 10;

/// libopus 编码引擎，直接持有 `OpusEncoder` 句柄
pub struct OpusEngine {
    encoder: NonNull<ffi::OpusEncoder>,
    channels: usize,
}

fn check(code: c_int) -> Result<c_int, CodecError> {
    if code < OPUS_OK {
        // opus_strerror 总是返回静态字符串
        let message = unsafe { CStr::from_ptr(ffi::opus_strerror(code)) }
            .to_string_lossy()
            .into_owned();
        Err(CodecError::Opus { code, message })
    } else {
        Ok(code)
    }
}

impl OpusEngine {
    pub fn new(config: &EncoderConfig) -> Result<Self, CodecError> {
        let channels = match config.channels {
            n @ (1 | 2) => n as usize,
            n => return Err(CodecError::Rejected(format!("声道数{}不受支持", n))),
        };

        let mut error: c_int = OPUS_OK;
        let raw = unsafe {
            ffi::opus_encoder_create(
                config.sample_rate as i32,
                channels as c_int,
                OPUS_APPLICATION_VOIP,
                &mut error,
            )
        };
        check(error)?;
        let encoder = NonNull::new(raw)
            .ok_or_else(|| CodecError::Rejected("opus_encoder_create 返回空句柄".to_string()))?;

        // 之后的错误由 Drop 释放句柄
        let mut engine = Self { encoder, channels };
        engine.set_ctl(OPUS_SET_BITRATE_REQUEST, (config.bitrate_kbps * 1000) as c_int)?;
        engine.set_ctl(OPUS_SET_VBR_REQUEST, 1)?;

        if config.fec {
            engine.set_ctl(OPUS_SET_INBAND_FEC_REQUEST, 1)?;
            engine.set_ctl(OPUS_SET_PACKET_LOSS_PERC_REQUEST, EXPECTED_PACKET_LOSS_PERC)?;
        }
        engine.set_ctl(OPUS_SET_DTX_REQUEST, c_int::from(config.dtx))?;

        debug!(
            "libopus 编码器已创建: {}Hz, {}声道, DTX={}, FEC={}",
            config.sample_rate,
            channels,
            engine.dtx_enabled()?,
            config.fec
        );
        Ok(engine)
    }

    /// 当前是否启用了 DTX（读取编码器内部状态）
    pub fn dtx_enabled(&mut self) -> Result<bool, CodecError> {
        let mut value: c_int = 0;
        check(unsafe {
            ffi::opus_encoder_ctl(self.encoder.as_ptr(), OPUS_GET_DTX_REQUEST, &mut value as *mut c_int)
        })?;
        Ok(value != 0)
    }

    fn set_ctl(&mut self, request: c_int, value: c_int) -> Result<(), CodecError> {
        check(unsafe { ffi::opus_encoder_ctl(self.encoder.as_ptr(), request, value) })?;
        Ok(())
    }
}

impl CodecEngine for OpusEngine {
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError> {
        let frame_size = (pcm.len() / self.channels) as c_int;
        let capacity = out.len().min(i32::MAX as usize) as i32;
        let written = unsafe {
            ffi::opus_encode(
                self.encoder.as_ptr(),
                pcm.as_ptr(),
                frame_size,
                out.as_mut_ptr(),
                capacity,
            )
        };
        Ok(check(written)? as usize)
    }

    fn set_bitrate(&mut self, bits_per_second: u32) -> Result<(), CodecError> {
        self.set_ctl(OPUS_SET_BITRATE_REQUEST, bits_per_second as c_int)
    }

    fn supports_dtx(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "libopus"
    }
}

impl Drop for OpusEngine {
    fn drop(&mut self) {
        unsafe { ffi::opus_encoder_destroy(self.encoder.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dtx: bool) -> EncoderConfig {
        EncoderConfig::default()
            .with_sample_rate(16000)
            .with_channels(1)
            .with_dtx(dtx)
    }

    #[test]
    fn test_dtx_follows_config() {
        let mut engine = OpusEngine::new(&config(true)).unwrap();
        assert!(engine.dtx_enabled().unwrap());

        let mut engine = OpusEngine::new(&config(false)).unwrap();
        assert!(!engine.dtx_enabled().unwrap());
    }

    #[test]
    fn test_silence_shrinks_with_dtx() {
        let mut engine = OpusEngine::new(&config(true)).unwrap();
        let silence = vec![0i16; 320];
        let mut out = vec![0u8; 1500];

        // 持续静音后 DTX 大多只输出单字节包，期间穿插舒适噪声更新
        let sizes: Vec<usize> = (0..50)
            .map(|_| engine.encode(&silence, &mut out).unwrap())
            .collect();
        let tiny = sizes.iter().skip(20).filter(|&&n| n <= 2).count();
        assert!(tiny >= 10, "{:?}", sizes);
    }

    #[test]
    fn test_rejects_bad_bitrate() {
        let mut engine = OpusEngine::new(&config(false)).unwrap();
        assert!(engine.set_bitrate(48_000).is_ok());
        assert!(engine.set_bitrate(0).is_err());
    }
}
