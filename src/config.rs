//! 编码器配置与能力协商
//!
//! 配置在 `init` 时校验，此后只能通过会话的显式操作（如 `set_bitrate`）修改。

use crate::error::{EncoderError, EncoderResult};

/// 每个采样的位数（小端有符号16位PCM）
pub const SAMPLE_BITS: usize = 16;

/// 每个采样（单声道）的字节数
pub const SAMPLE_BYTES: usize = SAMPLE_BITS / 8;

/// 单个编码包的输出缓冲区大小
pub const MAX_PACKET_SIZE: usize = 1500;

/// 编码器支持的采样率
pub const SUPPORTED_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// 码率下限（kbps）
pub const MIN_BITRATE_KBPS: u32 = 6;

/// 码率上限（kbps）
pub const MAX_BITRATE_KBPS: u32 = 510;

/// 能力位：支持不连续传输
pub const CAP_DTX: u32 = 1 << 0;
/// 能力位：支持带内前向纠错
pub const CAP_FEC: u32 = 1 << 1;
/// 能力位：支持可变码率
pub const CAP_VBR: u32 = 1 << 2;
/// 能力位：支持运行中修改码率
pub const CAP_BITRATE_CHANGE: u32 = 1 << 3;
/// 能力位：编码引擎为 libopus
pub const CAP_OPUS: u32 = 1 << 4;

/// 查询编译期能力位掩码
///
/// PCM 直通引擎只支持修改码率；libopus 额外提供 DTX、FEC 与 VBR。
pub fn capabilities() -> u32 {
    if cfg!(feature = "opus") {
        CAP_BITRATE_CHANGE | CAP_DTX | CAP_FEC | CAP_VBR | CAP_OPUS
    } else {
        CAP_BITRATE_CHANGE
    }
}

/// 编码帧时长
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameDuration {
    Ms2_5,
    Ms5,
    Ms10,
    #[default]
    Ms20,
    Ms40,
    Ms60,
}

impl FrameDuration {
    const ALL: [Self; 6] = [
        Self::Ms2_5,
        Self::Ms5,
        Self::Ms10,
        Self::Ms20,
        Self::Ms40,
        Self::Ms60,
    ];

    /// 从毫秒数解析帧时长，仅接受 2.5/5/10/20/40/60
    pub fn from_millis(ms: f32) -> Option<Self> {
        // 以上取值在 f32 中均可精确表示
        Self::ALL.into_iter().find(|d| d.as_millis_f32() == ms)
    }

    /// 以 0.1 毫秒为单位的时长
    fn tenths_of_ms(self) -> u32 {
        match self {
            Self::Ms2_5 => 25,
            Self::Ms5 => 50,
            Self::Ms10 => 100,
            Self::Ms20 => 200,
            Self::Ms40 => 400,
            Self::Ms60 => 600,
        }
    }

    pub fn as_millis_f32(self) -> f32 {
        self.tenths_of_ms() as f32 / 10.0
    }

    /// 给定采样率下每帧每声道的采样数
    pub fn samples_per_channel(self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.tenths_of_ms() as u64 / 10_000) as usize
    }
}

/// 编码器配置
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub sample_rate: u32,
    pub channels: u8,
    /// 目标码率（kbps）
    pub bitrate_kbps: u32,
    pub frame_duration: FrameDuration,
    pub dtx: bool,
    pub fec: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bitrate_kbps: 64,
            frame_duration: FrameDuration::Ms20,
            // DTX 与 FEC 默认开启
            dtx: true,
            fec: true,
        }
    }
}

impl EncoderConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    pub fn with_frame_duration(mut self, duration: FrameDuration) -> Self {
        self.frame_duration = duration;
        self
    }

    pub fn with_dtx(mut self, dtx: bool) -> Self {
        self.dtx = dtx;
        self
    }

    pub fn with_fec(mut self, fec: bool) -> Self {
        self.fec = fec;
        self
    }

    /// 校验配置是否被编码器支持
    pub fn validate(&self) -> EncoderResult<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(EncoderError::InvalidConfig(format!(
                "不支持的采样率: {} Hz",
                self.sample_rate
            )));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(EncoderError::InvalidConfig(format!(
                "不支持的声道数: {}",
                self.channels
            )));
        }
        if !bitrate_in_range(self.bitrate_kbps) {
            return Err(EncoderError::InvalidConfig(format!(
                "码率超出范围: {} kbps",
                self.bitrate_kbps
            )));
        }
        Ok(())
    }

    /// 每帧每声道的采样数
    pub fn frame_samples(&self) -> usize {
        self.frame_duration.samples_per_channel(self.sample_rate)
    }

    /// 一个交织采样（所有声道）的字节宽度
    pub fn sample_width(&self) -> usize {
        SAMPLE_BYTES * self.channels as usize
    }
}

/// 码率是否在编码器支持范围内
pub fn bitrate_in_range(kbps: u32) -> bool {
    (MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&kbps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration_parsing() {
        assert_eq!(FrameDuration::from_millis(2.5), Some(FrameDuration::Ms2_5));
        assert_eq!(FrameDuration::from_millis(20.0), Some(FrameDuration::Ms20));
        assert_eq!(FrameDuration::from_millis(60.0), Some(FrameDuration::Ms60));
        assert_eq!(FrameDuration::from_millis(30.0), None);
        assert_eq!(FrameDuration::from_millis(f32::NAN), None);
        // 接近但不等于合法值
        assert_eq!(FrameDuration::from_millis(20.04), None);
        assert_eq!(FrameDuration::from_millis(2.54), None);
        assert_eq!(FrameDuration::from_millis(59.99), None);
        assert_eq!(FrameDuration::default(), FrameDuration::Ms20);
    }

    #[test]
    fn test_frame_samples() {
        let config = EncoderConfig::default();
        assert_eq!(config.frame_samples(), 960);
        assert_eq!(config.sample_width(), 4);

        let config = config
            .with_sample_rate(8000)
            .with_channels(1)
            .with_frame_duration(FrameDuration::Ms2_5);
        assert_eq!(config.frame_samples(), 20);
        assert_eq!(config.sample_width(), 2);
    }

    #[test]
    fn test_validate() {
        assert!(EncoderConfig::default().validate().is_ok());

        let bad_rate = EncoderConfig::default().with_sample_rate(44100);
        assert!(matches!(bad_rate.validate(), Err(EncoderError::InvalidConfig(_))));

        let bad_channels = EncoderConfig::default().with_channels(3);
        assert!(matches!(bad_channels.validate(), Err(EncoderError::InvalidConfig(_))));

        let bad_bitrate = EncoderConfig::default().with_bitrate_kbps(2);
        assert!(matches!(bad_bitrate.validate(), Err(EncoderError::InvalidConfig(_))));
    }

    #[test]
    fn test_capabilities() {
        let caps = capabilities();
        assert_ne!(caps & CAP_BITRATE_CHANGE, 0);
        assert_eq!(caps & CAP_OPUS != 0, cfg!(feature = "opus"));
        assert_eq!(caps & CAP_DTX != 0, cfg!(feature = "opus"));
        assert_eq!(caps, capabilities());
    }
}
