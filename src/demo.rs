use tracing::{info, error};
use opus_enc_session::logging::init;
use opus_enc_session::{EncoderConfig, EncoderSession, EncodedPacket};

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

/// 每次送入编码器的块大小（采样数），故意不与帧长对齐
const CHUNK_SAMPLES: [usize; 4] = [137, 480, 1009, 64];

#[derive(Default)]
struct Stats {
    packets: usize,
    bytes: usize,
    first_ntp: Option<i64>,
    last_ntp: i64,
}

fn print_usage(cmd: &str) {
    println!("用法: {cmd} [采样率] [声道数] [码率kbps] < input.pcm");
    println!("\n输入为小端16位交织PCM。");
}

/// 解析 `[采样率] [声道数] [码率kbps]`，缺省项取默认值；参数非法时返回 None
fn parse_args(args: &[String]) -> Option<EncoderConfig> {
    if args.len() > 3 {
        return None;
    }

    let mut config = EncoderConfig::default();
    if let Some(rate) = args.first() {
        config = config.with_sample_rate(rate.parse().ok()?);
    }
    if let Some(channels) = args.get(1) {
        // 超出 u8 的声道数直接拒绝，避免截断
        config = config.with_channels(channels.parse::<u8>().ok()?);
    }
    if let Some(kbps) = args.get(2) {
        config = config.with_bitrate_kbps(kbps.parse().ok()?);
    }
    Some(config)
}

fn main() {

    // 日志系统初始化
    init();

    let mut args = std::env::args();
    let cmd = args.next().unwrap_or_default();
    let rest: Vec<String> = args.collect();

    let Some(config) = parse_args(&rest) else {
        print_usage(&cmd);
        return;
    };

    let mut pcm = Vec::new();
    if let Err(e) = std::io::stdin().read_to_end(&mut pcm) {
        error!("读取标准输入失败: {e}");
        return;
    }

    let mut session = EncoderSession::create();
    if let Err(e) = session.init(config.clone()) {
        error!("编码器初始化失败: {e}");
        return;
    }

    let stats = Rc::new(RefCell::new(Stats::default()));
    let sink_stats = stats.clone();
    session.set_cb_frame(move |packet: &EncodedPacket<'_>| {
        let mut stats = sink_stats.borrow_mut();
        stats.packets += 1;
        stats.bytes += packet.data.len();
        stats.first_ntp.get_or_insert(packet.ntp);
        stats.last_ntp = packet.ntp;
    });

    let width = config.sample_width();
    let usable = pcm.len() - pcm.len() % width;
    let mut offset = 0;
    let mut sent_samples: i64 = 0;

    for (opaque, &chunk_samples) in CHUNK_SAMPLES.iter().cycle().enumerate() {
        if offset >= usable {
            break;
        }
        let end = (offset + chunk_samples * width).min(usable);
        let block = &pcm[offset..end];
        sent_samples += (block.len() / width) as i64;

        // 块内最后一个采样的时间戳
        let ntp_ms = (sent_samples - 1) * 1000 / config.sample_rate as i64;
        if let Err(e) = session.encode(block, ntp_ms, opaque as i64) {
            error!("编码失败: {e}");
            break;
        }
        offset = end;
    }

    let partial = session.partial_samples();
    session.destroy();

    let stats = stats.borrow();
    info!(
        "完成: {}个包, {}字节, ntp {}..{}ms, 剩余{}个采样未成帧",
        stats.packets,
        stats.bytes,
        stats.first_ntp.unwrap_or(0),
        stats.last_ntp,
        partial
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(parse_args(&[]), Some(EncoderConfig::default()));

        let config = parse_args(&args(&["16000", "1", "24"])).unwrap();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.bitrate_kbps, 24);
    }

    #[test]
    fn test_parse_rejects_out_of_range_channels() {
        // 257 不能截断成单声道
        assert_eq!(parse_args(&args(&["48000", "257"])), None);
        assert_eq!(parse_args(&args(&["48000", "-1"])), None);
        assert_eq!(parse_args(&args(&["abc"])), None);
        assert_eq!(parse_args(&args(&["48000", "2", "64", "9"])), None);
    }
}
