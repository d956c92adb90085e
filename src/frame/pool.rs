use std::collections::VecDeque;
use crate::error::{EncoderError, EncoderResult};
use tracing::{debug, warn};

/// 帧缓冲区在池内的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

impl FrameId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 一个编码帧时长的音频
///
/// `ntp` 与 `opaque` 只描述帧内第一个采样。
#[derive(Debug)]
pub struct AudioFrame {
    /// 交织采样缓冲区，长度固定为 帧采样数 × 声道数
    buffer: Vec<i16>,
    /// 每声道的有效采样数
    samples: usize,
    channels: usize,
    ntp: i64,
    opaque: i64,
    in_use: bool,
}

impl AudioFrame {
    /// 每声道的有效采样数
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// 第一个采样的时间戳（毫秒）
    pub fn ntp(&self) -> i64 {
        self.ntp
    }

    /// 第一个采样的用户数据
    pub fn opaque(&self) -> i64 {
        self.opaque
    }

    /// 有效的交织PCM
    pub fn pcm(&self) -> &[i16] {
        &self.buffer[..self.samples * self.channels]
    }

    /// 每声道容量
    pub fn capacity(&self) -> usize {
        self.buffer.len() / self.channels
    }

    pub fn is_full(&self) -> bool {
        self.samples == self.capacity()
    }

    pub(crate) fn set_origin(&mut self, ntp: i64, opaque: i64) {
        self.ntp = ntp;
        self.opaque = opaque;
    }

    /// 追加小端16位PCM字节，`bytes` 必须是整数个交织采样
    pub(crate) fn append_le_bytes(&mut self, bytes: &[u8]) {
        let start = self.samples * self.channels;
        let count = bytes.len() / 2;
        for (dst, src) in self.buffer[start..start + count]
            .iter_mut()
            .zip(bytes.chunks_exact(2))
        {
            *dst = i16::from_le_bytes([src[0], src[1]]);
        }
        self.samples += count / self.channels;
    }

    fn clear(&mut self) {
        self.samples = 0;
        self.ntp = 0;
        self.opaque = 0;
    }
}

/// 帧缓冲池：按索引管理可复用的固定容量帧，避免热路径上的内存分配
pub struct FrameBufferPool {
    /// 所有帧（只增不减，直到 reset）
    frames: Vec<AudioFrame>,

    /// 空闲帧队列（快速获取）
    free_frames: VecDeque<FrameId>,

    /// 每帧每声道的采样数
    frame_samples: usize,

    channels: usize,
}

impl FrameBufferPool {
    /// 创建新的帧缓冲池
    pub fn new(frame_samples: usize, channels: usize) -> Self {
        Self {
            frames: Vec::new(),
            free_frames: VecDeque::new(),
            frame_samples,
            channels: channels.max(1),
        }
    }

    /// 获取一个空帧
    /// - 优先复用空闲帧，否则按配置容量分配新帧
    /// - 只有内存分配失败时返回错误
    pub fn acquire(&mut self) -> EncoderResult<FrameId> {
        // 1. 优先使用空闲帧
        if let Some(id) = self.free_frames.pop_front() {
            self.frames[id.0].in_use = true;
            return Ok(id);
        }

        // 2. 分配新帧
        let len = self.frame_samples * self.channels;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|_| EncoderError::AllocationFailure { requested: len })?;
        buffer.resize(len, 0);

        self.frames
            .try_reserve(1)
            .map_err(|_| EncoderError::AllocationFailure { requested: len })?;
        self.free_frames
            .try_reserve(self.frames.len() + 1)
            .map_err(|_| EncoderError::AllocationFailure { requested: len })?;

        let id = FrameId(self.frames.len());
        self.frames.push(AudioFrame {
            buffer,
            samples: 0,
            channels: self.channels,
            ntp: 0,
            opaque: 0,
            in_use: true,
        });

        debug!("帧缓冲池扩容: 共{}帧, 每帧{}个采样", self.frames.len(), len);
        Ok(id)
    }

    /// 归还帧（清空有效采样数与元数据）
    pub fn release(&mut self, id: FrameId) {
        let Some(frame) = self.frames.get_mut(id.0) else {
            warn!("归还未知帧 {}", id.0);
            return;
        };
        if !frame.in_use {
            warn!("重复归还帧 {}", id.0);
            return;
        }

        frame.clear();
        frame.in_use = false;
        self.free_frames.push_back(id);
    }

    pub fn frame(&self, id: FrameId) -> &AudioFrame {
        &self.frames[id.0]
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut AudioFrame {
        &mut self.frames[id.0]
    }

    /// 按新的帧容量重建（释放所有帧）
    pub fn reset(&mut self, frame_samples: usize, channels: usize) {
        self.frames.clear();
        self.free_frames.clear();
        self.frame_samples = frame_samples;
        self.channels = channels.max(1);
    }

    /// 获取统计信息
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_frames: self.frames.len(),
            free_frames: self.free_frames.len(),
            in_use_frames: self.frames.len() - self.free_frames.len(),
            frame_samples: self.frame_samples,
            channels: self.channels,
        }
    }
}

/// 帧缓冲池统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total_frames: usize,
    pub free_frames: usize,
    pub in_use_frames: usize,
    pub frame_samples: usize,
    pub channels: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pool_basic() {
        let mut pool = FrameBufferPool::new(960, 2);

        // 获取帧
        let frame1 = pool.acquire().unwrap();
        let frame2 = pool.acquire().unwrap();
        assert_ne!(frame1, frame2);

        // 验证状态
        assert_eq!(pool.stats().total_frames, 2);
        assert_eq!(pool.stats().free_frames, 0);
        assert_eq!(pool.stats().in_use_frames, 2);
        assert_eq!(pool.frame(frame1).capacity(), 960);

        // 释放帧
        pool.release(frame1);
        assert_eq!(pool.stats().free_frames, 1);

        // 再次获取应该得到空闲帧，不再分配
        let frame3 = pool.acquire().unwrap();
        assert_eq!(frame3, frame1);
        assert_eq!(pool.stats().total_frames, 2);
    }

    #[test]
    fn test_release_clears_frame() {
        let mut pool = FrameBufferPool::new(4, 1);
        let id = pool.acquire().unwrap();
        {
            let frame = pool.frame_mut(id);
            frame.set_origin(1234, 7);
            frame.append_le_bytes(&[1, 0, 2, 0]);
            assert_eq!(frame.pcm(), &[1, 2]);
        }

        pool.release(id);
        let again = pool.acquire().unwrap();
        assert_eq!(again, id);
        let frame = pool.frame(again);
        assert_eq!(frame.samples(), 0);
        assert_eq!(frame.ntp(), 0);
        assert_eq!(frame.opaque(), 0);
        assert!(frame.pcm().is_empty());
    }

    #[test]
    fn test_double_release_ignored() {
        let mut pool = FrameBufferPool::new(4, 1);
        let id = pool.acquire().unwrap();
        pool.release(id);
        pool.release(id);
        assert_eq!(pool.stats().free_frames, 1);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_stereo_append() {
        let mut pool = FrameBufferPool::new(2, 2);
        let id = pool.acquire().unwrap();
        let frame = pool.frame_mut(id);
        frame.append_le_bytes(&[1, 0, 0xFF, 0xFF]);
        assert_eq!(frame.samples(), 1);
        assert!(!frame.is_full());
        frame.append_le_bytes(&[3, 0, 4, 0]);
        assert!(frame.is_full());
        assert_eq!(frame.pcm(), &[1, -1, 3, 4]);
    }

    #[test]
    fn test_reset() {
        let mut pool = FrameBufferPool::new(960, 1);
        pool.acquire().unwrap();
        pool.reset(480, 2);
        let stats = pool.stats();
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.frame_samples, 480);
        assert_eq!(stats.channels, 2);

        let id = pool.acquire().unwrap();
        assert_eq!(pool.frame(id).capacity(), 480);
    }
}
