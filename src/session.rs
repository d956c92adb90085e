//! 编码会话 - 生命周期、码率调整与编码分发
//!
//! 状态机: `Uninitialized → Initialized → (Encoding ⇄ Reconfiguring) → Destroyed`
//!
//! 会话是单线程同步模型：所有操作在调用线程上完成后返回，
//! 调用方负责串行化对同一会话的访问。

use crate::codec::{default_engine, CodecEngine, EngineFactory};
use crate::config::{self, EncoderConfig, MAX_BITRATE_KBPS, MIN_BITRATE_KBPS};
use crate::error::{EncoderError, EncoderResult};
use crate::frame::{FrameAssembler, PoolStats};
use crate::sink::{CallbackSink, EncodedPacket, FrameSink, LogSink};
use log::Level;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Encoding,
    Reconfiguring,
    Destroyed,
}

/// 编码会话：持有编码引擎、帧队列、配置与回调
pub struct EncoderSession {
    id: Uuid,
    state: SessionState,
    config: Option<EncoderConfig>,

    /// 编码引擎，`init` 前为空
    engine: Option<Box<dyn CodecEngine>>,
    factory: EngineFactory,

    /// 帧组装器，`init` 时按配置创建
    assembler: Option<FrameAssembler>,

    /// 编码输出缓冲区，回调期间借给调用方
    packet_buf: Vec<u8>,

    sink: CallbackSink,
}

impl EncoderSession {
    /// 创建会话（使用默认编码引擎）
    pub fn create() -> Self {
        Self::with_engine_factory(Box::new(default_engine))
    }

    /// 使用自定义编码引擎创建会话
    pub fn with_engine_factory(factory: EngineFactory) -> Self {
        let id = Uuid::new_v4();
        debug!("创建编码会话 {}", id);
        Self {
            id,
            state: SessionState::Uninitialized,
            config: None,
            engine: None,
            factory,
            assembler: None,
            packet_buf: Vec::new(),
            sink: CallbackSink::new(id),
        }
    }

    /// 初始化编码器
    ///
    /// 重复调用视为重新初始化：先释放旧的编码引擎并丢弃所有未编码帧与旧配置，
    /// 再创建新引擎。配置校验失败时会话保持不变；新引擎创建失败时会话回到未初始化状态。
    pub fn init(&mut self, config: EncoderConfig) -> EncoderResult<()> {
        config.validate()?;

        if self.engine.take().is_some() {
            let dropped = self.pending_frames();
            if let Some(assembler) = self.assembler.as_mut() {
                assembler.clear();
            }
            self.config = None;
            self.state = SessionState::Uninitialized;
            self.sink.log(
                Level::Info,
                &format!("重新初始化，释放旧编码器，丢弃{}个待编码帧", dropped),
            );
        }

        let engine = match (self.factory)(&config) {
            Ok(engine) => engine,
            Err(e) => {
                self.sink.log(Level::Error, &format!("编码器初始化失败: {}", e));
                return Err(EncoderError::CodecInitFailure(e));
            }
        };

        match self.assembler.as_mut() {
            Some(assembler) => assembler.reset(&config),
            None => self.assembler = Some(FrameAssembler::new(&config)),
        }

        self.packet_buf.clear();
        self.packet_buf.resize(engine.max_packet_size(), 0);

        if config.dtx && !engine.supports_dtx() {
            self.sink.log(
                Level::Warn,
                &format!("编码引擎{}不支持DTX，静音段将照常编码", engine.name()),
            );
        }

        self.sink.log(
            Level::Info,
            &format!(
                "编码器初始化完成: 引擎={}, {}Hz, {}声道, {}kbps, 帧长{}ms ({}个采样), DTX={}, FEC={}",
                engine.name(),
                config.sample_rate,
                config.channels,
                config.bitrate_kbps,
                config.frame_duration.as_millis_f32(),
                config.frame_samples(),
                config.dtx,
                config.fec
            ),
        );

        self.engine = Some(engine);
        self.config = Some(config);
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// 查询能力位掩码（无副作用）
    pub fn get_caps() -> u32 {
        config::capabilities()
    }

    /// 注册日志回调，替换已有注册
    pub fn set_cb_log<S: LogSink + 'static>(&mut self, sink: S) {
        self.sink.set_log_sink(Some(Box::new(sink)));
    }

    pub fn clear_cb_log(&mut self) {
        self.sink.set_log_sink(None);
    }

    /// 注册编码包回调，替换已有注册
    pub fn set_cb_frame<S: FrameSink + 'static>(&mut self, sink: S) {
        self.sink.set_frame_sink(Some(Box::new(sink)));
    }

    pub fn clear_cb_frame(&mut self) {
        self.sink.set_frame_sink(None);
    }

    /// 修改目标码率，从下一帧开始生效，不影响待编码队列
    pub fn set_bitrate(&mut self, kbps: u32) -> EncoderResult<()> {
        let previous = self.state;
        if !matches!(previous, SessionState::Initialized | SessionState::Encoding) {
            return Err(EncoderError::InvalidState {
                operation: "set_bitrate",
                state: previous,
            });
        }

        let invalid = EncoderError::InvalidBitrate {
            kbps,
            min: MIN_BITRATE_KBPS,
            max: MAX_BITRATE_KBPS,
        };
        if !config::bitrate_in_range(kbps) {
            return Err(invalid);
        }

        let (Some(engine), Some(config)) = (self.engine.as_mut(), self.config.as_mut()) else {
            return Err(EncoderError::InvalidState {
                operation: "set_bitrate",
                state: previous,
            });
        };

        self.state = SessionState::Reconfiguring;
        let result = engine.set_bitrate(kbps * 1000);
        self.state = previous;

        match result {
            Ok(()) => {
                let old = config.bitrate_kbps;
                config.bitrate_kbps = kbps;
                self.sink
                    .log(Level::Info, &format!("码率调整: {}kbps -> {}kbps", old, kbps));
                Ok(())
            }
            Err(e) => {
                self.sink.log(Level::Warn, &format!("编码器拒绝码率{}kbps: {}", kbps, e));
                Err(invalid)
            }
        }
    }

    /// 编码一个PCM块
    ///
    /// # 参数
    /// * `data` - 小端16位交织PCM
    /// * `ntp_ms` - 块内最后一个采样的时间戳
    /// * `opaque` - 用户数据，随第一个采样落在本块内的帧输出
    ///
    /// # 返回
    /// 本次调用编码的帧数。编码失败时停在失败帧，
    /// 之前的帧已经投递，失败帧及其后的帧保留在队列中等待下次调用。
    pub fn encode(&mut self, data: &[u8], ntp_ms: i64, opaque: i64) -> EncoderResult<usize> {
        if !matches!(self.state, SessionState::Initialized | SessionState::Encoding) {
            return Err(EncoderError::InvalidState {
                operation: "encode",
                state: self.state,
            });
        }
        if data.is_empty() {
            return Ok(0);
        }

        let current = self.state;
        let Self {
            engine: Some(engine),
            assembler: Some(assembler),
            packet_buf,
            sink,
            state,
            ..
        } = self
        else {
            return Err(EncoderError::InvalidState {
                operation: "encode",
                state: current,
            });
        };

        assembler.push(data, ntp_ms, opaque)?;
        *state = SessionState::Encoding;

        if !sink.has_frame_sink() {
            trace!("未注册编码包回调，编码结果将被丢弃");
        }

        let mut encoded = 0;
        while let Some(id) = assembler.front() {
            let frame = assembler.frame(id);
            let (ntp, opaque) = (frame.ntp(), frame.opaque());

            match engine.encode(frame.pcm(), &mut packet_buf[..]) {
                Ok(len) => {
                    let data = &packet_buf[..len];
                    trace!(
                        "编码帧: {}字节, ntp={}, opaque={}, 包头={}",
                        len,
                        ntp,
                        opaque,
                        hex::encode(&data[..len.min(8)])
                    );
                    sink.deliver(&EncodedPacket { data, ntp, opaque });
                    assembler.pop_front();
                    assembler.recycle(id);
                    encoded += 1;
                }
                Err(e) => {
                    sink.log(
                        Level::Warn,
                        &format!(
                            "帧编码失败 (ntp={}): {}，{}帧保留待重试",
                            ntp,
                            e,
                            assembler.pending()
                        ),
                    );
                    return Err(EncoderError::EncodeFailure { encoded, source: e });
                }
            }
        }

        Ok(encoded)
    }

    /// 销毁会话：释放编码引擎、所有帧与回调
    ///
    /// 会话被消耗，销毁后不会再有任何回调。
    pub fn destroy(mut self) {
        self.state = SessionState::Destroyed;
        let pending = self.assembler.as_ref().map(|a| a.pending()).unwrap_or(0);

        self.engine = None;
        if let Some(assembler) = self.assembler.as_mut() {
            assembler.clear();
        }
        self.assembler = None;

        self.sink
            .log(Level::Info, &format!("编码会话已销毁，丢弃{}个待编码帧", pending));
        self.sink.clear();
        info!("编码会话 {} 资源已释放", self.id);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> Option<&EncoderConfig> {
        self.config.as_ref()
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    /// 等待编码的完整帧数
    pub fn pending_frames(&self) -> usize {
        self.assembler.as_ref().map(|a| a.pending()).unwrap_or(0)
    }

    /// 尾帧中已缓存的每声道采样数
    pub fn partial_samples(&self) -> usize {
        self.assembler.as_ref().map(|a| a.partial_samples()).unwrap_or(0)
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.assembler.as_ref().map(|a| a.pool_stats())
    }
}
