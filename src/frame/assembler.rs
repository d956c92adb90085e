use std::collections::VecDeque;
use crate::config::{EncoderConfig, SAMPLE_BYTES};
use crate::error::{EncoderError, EncoderResult};
use super::pool::{AudioFrame, FrameBufferPool, FrameId, PoolStats};
use tracing::{debug, trace};

/// 帧组装器：把任意长度的PCM块切分为固定时长的编码帧
///
/// 不完整的尾帧在调用之间保留；完整帧按到达顺序进入待编码队列。
pub struct FrameAssembler {
    pool: FrameBufferPool,

    /// 待编码帧（FIFO）
    pending: VecDeque<FrameId>,

    /// 正在填充的帧
    current: Option<FrameId>,

    /// 本次调用预先获取的帧，保证复制过程不会失败
    reserved: Vec<FrameId>,

    frame_samples: usize,
    channels: usize,
    sample_rate: u32,
}

impl FrameAssembler {
    /// 创建新的帧组装器
    pub fn new(config: &EncoderConfig) -> Self {
        let frame_samples = config.frame_samples();
        let channels = config.channels as usize;
        Self {
            pool: FrameBufferPool::new(frame_samples, channels),
            pending: VecDeque::new(),
            current: None,
            reserved: Vec::new(),
            frame_samples,
            channels,
            sample_rate: config.sample_rate,
        }
    }

    /// 按新配置重置，所有帧（包括未完成帧）都被释放
    pub fn reset(&mut self, config: &EncoderConfig) {
        self.pending.clear();
        self.current = None;
        self.reserved.clear();
        self.frame_samples = config.frame_samples();
        self.channels = config.channels as usize;
        self.sample_rate = config.sample_rate;
        self.pool.reset(self.frame_samples, self.channels);
    }

    /// 一个交织采样的字节宽度
    pub fn sample_width(&self) -> usize {
        SAMPLE_BYTES * self.channels
    }

    /// 追加一个PCM块
    ///
    /// # 参数
    /// * `data` - 小端16位交织PCM
    /// * `ntp_ms` - 块内最后一个采样的时间戳
    /// * `opaque` - 块的用户数据，赋给第一个采样落在本块内的帧
    ///
    /// # 返回
    /// 本次新完成的帧数。出错时组装器状态不变。
    pub fn push(&mut self, data: &[u8], ntp_ms: i64, opaque: i64) -> EncoderResult<usize> {
        let width = self.sample_width();
        if data.len() % width != 0 {
            return Err(EncoderError::MalformedInput {
                len: data.len(),
                width,
            });
        }

        let block_samples = data.len() / width;
        if block_samples == 0 {
            return Ok(0);
        }

        self.reserve_frames(block_samples)?;

        let mut offset = 0;
        let mut completed = 0;
        while offset < block_samples {
            let id = match self.current {
                Some(id) => id,
                None => {
                    // reserve_frames 已保证数量足够
                    let Some(id) = self.reserved.pop() else { break };
                    self.current = Some(id);
                    id
                }
            };

            let origin_ntp = ntp_ms.saturating_sub(self.samples_to_ms(block_samples - 1 - offset));
            let frame = self.pool.frame_mut(id);

            // 先写入者为准：跨块延续的帧保留原有的时间戳与用户数据
            if frame.samples() == 0 {
                frame.set_origin(origin_ntp, opaque);
            }

            let take = (self.frame_samples - frame.samples()).min(block_samples - offset);
            frame.append_le_bytes(&data[offset * width..(offset + take) * width]);
            offset += take;

            if frame.is_full() {
                trace!("帧{}完成: ntp={}, opaque={}", id.index(), frame.ntp(), frame.opaque());
                self.pending.push_back(id);
                self.current = None;
                completed += 1;
            }
        }

        debug!(
            "PCM块: {}个采样, 完成{}帧, 待编码{}帧, 尾帧{}个采样",
            block_samples,
            completed,
            self.pending.len(),
            self.partial_samples()
        );
        Ok(completed)
    }

    /// 预先获取本块需要的新帧；失败时全部归还
    fn reserve_frames(&mut self, block_samples: usize) -> EncoderResult<()> {
        let partial = self.partial_samples();
        let touched = (partial + block_samples).div_ceil(self.frame_samples);
        let needed = touched - usize::from(self.current.is_some());

        for _ in 0..needed {
            match self.pool.acquire() {
                Ok(id) => self.reserved.push(id),
                Err(e) => {
                    for id in self.reserved.drain(..) {
                        self.pool.release(id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// 采样数对应的毫秒数（四舍五入）
    fn samples_to_ms(&self, samples: usize) -> i64 {
        let rate = self.sample_rate as i64;
        (samples as i64 * 1000 + rate / 2) / rate
    }

    /// 队首待编码帧
    pub fn front(&self) -> Option<FrameId> {
        self.pending.front().copied()
    }

    /// 移除队首帧（调用方负责 recycle）
    pub fn pop_front(&mut self) -> Option<FrameId> {
        self.pending.pop_front()
    }

    /// 编码完成后归还帧
    pub fn recycle(&mut self, id: FrameId) {
        self.pool.release(id);
    }

    pub fn frame(&self, id: FrameId) -> &AudioFrame {
        self.pool.frame(id)
    }

    /// 待编码帧数
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// 待编码帧（按顺序）
    pub fn pending_frames(&self) -> impl Iterator<Item = &AudioFrame> + '_ {
        self.pending.iter().map(|&id| self.pool.frame(id))
    }

    /// 尾帧中已有的每声道采样数
    pub fn partial_samples(&self) -> usize {
        self.current
            .map(|id| self.pool.frame(id).samples())
            .unwrap_or(0)
    }

    /// 清空待编码队列与尾帧，帧归还到池中
    pub fn clear(&mut self) {
        while let Some(id) = self.pending.pop_front() {
            self.pool.release(id);
        }
        if let Some(id) = self.current.take() {
            self.pool.release(id);
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
