//! 回调输出 - 编码包与日志事件的同步投递
//!
//! 所有回调都在调用方线程上、在产生它的API调用内同步执行，没有内部排队。
//! 回调不得 panic，会话不捕获回调中的展开。

use crate::logging;
use log::Level;
use uuid::Uuid;

/// 一帧的编码结果
///
/// `data` 只在回调期间有效，需要保留时由调用方复制。
#[derive(Debug, Clone, Copy)]
pub struct EncodedPacket<'a> {
    pub data: &'a [u8],
    /// 帧内第一个采样的时间戳（毫秒）
    pub ntp: i64,
    /// 帧内第一个采样的用户数据
    pub opaque: i64,
}

/// 编码包接收端
pub trait FrameSink {
    fn on_frame(&mut self, packet: &EncodedPacket<'_>);
}

impl<F> FrameSink for F
where
    F: FnMut(&EncodedPacket<'_>),
{
    fn on_frame(&mut self, packet: &EncodedPacket<'_>) {
        self(packet)
    }
}

/// 日志接收端
pub trait LogSink {
    fn on_log(&mut self, level: Level, message: &str);
}

impl<F> LogSink for F
where
    F: FnMut(Level, &str),
{
    fn on_log(&mut self, level: Level, message: &str) {
        self(level, message)
    }
}

/// 会话持有的两个回调注册，每种至多一个，重新注册即替换
pub(crate) struct CallbackSink {
    session_id: Uuid,
    frame: Option<Box<dyn FrameSink>>,
    log: Option<Box<dyn LogSink>>,
}

impl CallbackSink {
    pub(crate) fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            frame: None,
            log: None,
        }
    }

    pub(crate) fn set_frame_sink(&mut self, sink: Option<Box<dyn FrameSink>>) {
        self.frame = sink;
    }

    pub(crate) fn set_log_sink(&mut self, sink: Option<Box<dyn LogSink>>) {
        self.log = sink;
    }

    pub(crate) fn has_frame_sink(&self) -> bool {
        self.frame.is_some()
    }

    /// 投递编码包；未注册时丢弃
    pub(crate) fn deliver(&mut self, packet: &EncodedPacket<'_>) {
        if let Some(sink) = self.frame.as_mut() {
            sink.on_frame(packet);
        }
    }

    /// 记录日志：同时写入 tracing 与调用方的日志回调
    pub(crate) fn log(&mut self, level: Level, message: &str) {
        logging::mirror(level, &self.session_id, message);
        if let Some(sink) = self.log.as_mut() {
            sink.on_log(level, message);
        }
    }

    /// 注销全部回调
    pub(crate) fn clear(&mut self) {
        self.frame = None;
        self.log = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_replace_frame_sink() {
        let first = Rc::new(RefCell::new(0));
        let second = Rc::new(RefCell::new(0));
        let mut sink = CallbackSink::new(Uuid::new_v4());

        let counter = first.clone();
        sink.set_frame_sink(Some(Box::new(move |_: &EncodedPacket<'_>| {
            *counter.borrow_mut() += 1;
        })));
        let packet = EncodedPacket { data: &[1, 2, 3], ntp: 0, opaque: 0 };
        sink.deliver(&packet);

        // 重新注册替换旧回调，不串联
        let counter = second.clone();
        sink.set_frame_sink(Some(Box::new(move |_: &EncodedPacket<'_>| {
            *counter.borrow_mut() += 1;
        })));
        sink.deliver(&packet);

        assert_eq!(*first.borrow(), 1);
        assert_eq!(*second.borrow(), 1);
    }

    #[test]
    fn test_log_sink_receives_level() {
        let logs = Rc::new(RefCell::new(Vec::new()));
        let mut sink = CallbackSink::new(Uuid::new_v4());

        let captured = logs.clone();
        sink.set_log_sink(Some(Box::new(move |level: Level, msg: &str| {
            captured.borrow_mut().push((level, msg.to_string()));
        })));
        sink.log(Level::Warn, "测试");
        sink.clear();
        sink.log(Level::Info, "注销后");

        assert_eq!(*logs.borrow(), vec![(Level::Warn, "测试".to_string())]);
    }
}
