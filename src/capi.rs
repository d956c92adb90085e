use libc::{c_char, c_float, c_int, c_longlong, c_uchar, c_void};
use log::Level;
use std::ffi::CString;
use crate::config::{EncoderConfig, FrameDuration};
use crate::error::EncoderError;
use crate::session::EncoderSession;
use crate::sink::{EncodedPacket, FrameSink, LogSink};

/// Encoder configuration as passed from C.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AudioEncConfig {
    pub sample_rate: c_int,
    pub channels: c_int,
    /// target bitrate in kbps
    pub bitrate: c_int,
    /// 2.5, 5, 10, 20, 40 or 60; zero or negative selects 20
    pub frame_duration_ms: c_float,
    pub dtx: c_int,
}

/// Encoded frame callback: (data, len, ntp of the first sample, opaque of the first sample, arg)
pub type CbEncOutput = Option<
    unsafe extern "C" fn(
        data: *const c_uchar,
        len: c_int,
        ntp: c_longlong,
        opaque: c_longlong,
        arg: *mut c_void,
    ),
>;

/// Log callback: (level, NUL-terminated message, arg). Levels: 1 error .. 5 trace.
pub type CbEncLog = Option<unsafe extern "C" fn(level: c_int, msg: *const c_char, arg: *mut c_void)>;

/// Opaque handle for EncoderSession
pub struct OpusEncContext(EncoderSession);

struct CFrameSink {
    cb: unsafe extern "C" fn(*const c_uchar, c_int, c_longlong, c_longlong, *mut c_void),
    arg: *mut c_void,
}

impl FrameSink for CFrameSink {
    fn on_frame(&mut self, packet: &EncodedPacket<'_>) {
        unsafe {
            (self.cb)(
                packet.data.as_ptr(),
                packet.data.len() as c_int,
                packet.ntp,
                packet.opaque,
                self.arg,
            );
        }
    }
}

struct CLogSink {
    cb: unsafe extern "C" fn(c_int, *const c_char, *mut c_void),
    arg: *mut c_void,
}

impl LogSink for CLogSink {
    fn on_log(&mut self, level: Level, message: &str) {
        // Interior NULs would truncate the message on the C side anyway
        let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
        unsafe {
            (self.cb)(level as usize as c_int, text.as_ptr(), self.arg);
        }
    }
}

fn to_config(raw: &AudioEncConfig) -> Result<EncoderConfig, EncoderError> {
    let sample_rate = u32::try_from(raw.sample_rate)
        .map_err(|_| EncoderError::InvalidConfig(format!("sample rate {}", raw.sample_rate)))?;
    let channels = u8::try_from(raw.channels)
        .map_err(|_| EncoderError::InvalidConfig(format!("channels {}", raw.channels)))?;
    let bitrate_kbps = u32::try_from(raw.bitrate)
        .map_err(|_| EncoderError::InvalidConfig(format!("bitrate {}", raw.bitrate)))?;

    let frame_duration = if raw.frame_duration_ms <= 0.0 {
        FrameDuration::default()
    } else {
        FrameDuration::from_millis(raw.frame_duration_ms).ok_or_else(|| {
            EncoderError::InvalidConfig(format!("frame duration {}ms", raw.frame_duration_ms))
        })?
    };

    Ok(EncoderConfig::default()
        .with_sample_rate(sample_rate)
        .with_channels(channels)
        .with_bitrate_kbps(bitrate_kbps)
        .with_frame_duration(frame_duration)
        .with_dtx(raw.dtx != 0))
}

/// Create an encoder session.
/// The caller must free it with opus_enc_destroy.
/// Returns 0 on success, negative on error.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_create(ctx: *mut *mut OpusEncContext) -> c_int {
    if ctx.is_null() {
        return EncoderError::InvalidArgument("ctx").code();
    }
    let handle = Box::into_raw(Box::new(OpusEncContext(EncoderSession::create())));
    unsafe {
        *ctx = handle;
    }
    0
}

/// Init (or re-init) the encoder. DTX and FEC are enabled by default, frame size defaults to 20ms.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_init(ctx: *mut OpusEncContext, config: *const AudioEncConfig) -> c_int {
    if ctx.is_null() || config.is_null() {
        return EncoderError::InvalidArgument("ctx/config").code();
    }
    let session = unsafe { &mut (*ctx).0 };
    let raw = unsafe { &*config };

    match to_config(raw).and_then(|config| session.init(config)) {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

/// Query the capabilities of the encoder.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_get_caps() -> c_int {
    EncoderSession::get_caps() as c_int
}

/// Set the log callback. A null callback with a null arg clears the registration.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_set_cb_log(ctx: *mut OpusEncContext, cb_log: CbEncLog, arg: *mut c_void) -> c_int {
    if ctx.is_null() {
        return EncoderError::InvalidArgument("ctx").code();
    }
    let session = unsafe { &mut (*ctx).0 };

    match cb_log {
        Some(cb) => session.set_cb_log(CLogSink { cb, arg }),
        None if arg.is_null() => session.clear_cb_log(),
        None => return EncoderError::InvalidArgument("null log callback with user data").code(),
    }
    0
}

/// Set the callback for encoded frames. A null callback with a null arg clears the registration.
/// Returns 0 on success, negative on error.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_set_cb_frame(ctx: *mut OpusEncContext, cb_frame: CbEncOutput, arg: *mut c_void) -> c_int {
    if ctx.is_null() {
        return EncoderError::InvalidArgument("ctx").code();
    }
    let session = unsafe { &mut (*ctx).0 };

    match cb_frame {
        Some(cb) => session.set_cb_frame(CFrameSink { cb, arg }),
        None if arg.is_null() => session.clear_cb_frame(),
        None => return EncoderError::InvalidArgument("null frame callback with user data").code(),
    }
    0
}

/// Change the target bitrate; takes effect from the next encoded frame.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_set_bitrate(ctx: *mut OpusEncContext, bitrate_in_kbps: c_int) -> c_int {
    if ctx.is_null() {
        return EncoderError::InvalidArgument("ctx").code();
    }
    let session = unsafe { &mut (*ctx).0 };

    // Negative values map to 0, which is out of range
    let kbps = u32::try_from(bitrate_in_kbps).unwrap_or(0);
    match session.set_bitrate(kbps) {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

/// Encode one audio block.
/// data: 16-bit little-endian interleaved PCM
/// ntp_in_ms: ntp of the last sample
/// Returns the number of frames encoded, negative on error.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_encode(
    ctx: *mut OpusEncContext,
    data: *const c_void,
    data_len_in_bytes: c_int,
    ntp_in_ms: c_longlong,
    opaque: c_longlong,
) -> c_int {
    if ctx.is_null() || data_len_in_bytes < 0 || (data.is_null() && data_len_in_bytes > 0) {
        return EncoderError::InvalidArgument("ctx/data").code();
    }
    let session = unsafe { &mut (*ctx).0 };
    let block: &[u8] = if data_len_in_bytes == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data as *const u8, data_len_in_bytes as usize) }
    };

    match session.encode(block, ntp_in_ms, opaque) {
        Ok(frames) => frames as c_int,
        Err(e) => e.code(),
    }
}

/// Destroy the encoder. Must be called exactly once per handle.
#[unsafe(no_mangle)]
pub extern "C" fn opus_enc_destroy(ctx: *mut OpusEncContext) {
    if !ctx.is_null() {
        let handle = unsafe { Box::from_raw(ctx) };
        handle.0.destroy();
    }
}
