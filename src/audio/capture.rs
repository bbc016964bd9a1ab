//! Microphone capture: fixed-size 16 kHz frames with speex cleanup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use super::device;
use super::pcm::{self, AudioFrame, CAPTURE_SAMPLE_RATE, FRAME_SAMPLES};
use super::speex::Preprocessor;

/// RMS above this counts as speech for the onset/offset log lines. Purely
/// advisory, every frame is forwarded regardless.
const SPEECH_RMS_THRESHOLD: f32 = 0.01;

/// One capture frame plus its raw input level.
pub struct CapturedFrame {
    pub frame: AudioFrame,
    pub level: f32,
}

/// Accumulates device reads of arbitrary length into exact frames.
struct FrameChunker {
    size: usize,
    buf: Vec<f32>,
}

impl FrameChunker {
    fn new(size: usize) -> Self {
        Self { size, buf: Vec::with_capacity(size * 2) }
    }

    fn push(&mut self, samples: &[f32]) {
        self.buf.extend_from_slice(samples);
    }

    fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.buf.len() < self.size {
            return None;
        }
        let rest = self.buf.split_off(self.size);
        Some(std::mem::replace(&mut self.buf, rest))
    }
}

/// Owns the capture thread. Frames arrive on the channel handed to `start`.
pub struct Capture {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Capture {
    /// Open the capture device and start reading. Device failures surface
    /// here, before any thread exists.
    pub fn start(device_name: &str, tx: Sender<CapturedFrame>) -> Result<Self> {
        let (pcm, params) = device::open_capture(device_name, CAPTURE_SAMPLE_RATE)
            .context("failed to open capture device")?;
        log::info!(
            "capture ready: {} Hz, {} ch, period {} frames",
            params.sample_rate,
            params.channels,
            params.period_size
        );

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("voice-capture".into())
            .spawn(move || capture_loop(pcm, flag, tx))
            .context("failed to spawn capture thread")?;
        Ok(Self { running, handle: Some(handle) })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(pcm: alsa::pcm::PCM, running: Arc<AtomicBool>, tx: Sender<CapturedFrame>) {
    let mut preprocessor = match Preprocessor::new(FRAME_SAMPLES, CAPTURE_SAMPLE_RATE) {
        Ok(p) => p,
        Err(e) => {
            log::error!("speex preprocessor init failed: {}", e);
            return;
        }
    };
    preprocessor.set_denoise(true);
    preprocessor.set_noise_suppress(-25);
    preprocessor.set_agc(true);
    preprocessor.set_agc_level(24000.0);

    let io = match pcm.io_f32() {
        Ok(io) => io,
        Err(e) => {
            log::error!("capture io setup failed: {}", e);
            return;
        }
    };

    let mut chunker = FrameChunker::new(FRAME_SAMPLES);
    let mut read_buf = vec![0.0f32; FRAME_SAMPLES];
    let mut in_speech = false;

    while running.load(Ordering::SeqCst) {
        let read = match io.readi(&mut read_buf) {
            Ok(n) => n,
            Err(e) => {
                // 过载恢复：prepare 后重试读取
                log::warn!("capture read error: {}, recovering...", e);
                if let Err(e) = pcm.prepare() {
                    log::error!("capture device unrecoverable: {}", e);
                    return;
                }
                continue;
            }
        };
        if read == 0 {
            continue;
        }
        chunker.push(&read_buf[..read]);

        while let Some(samples) = chunker.next_frame() {
            let level = pcm::rms(&samples);
            if level >= SPEECH_RMS_THRESHOLD && !in_speech {
                in_speech = true;
                log::debug!("speech onset, rms {:.4}", level);
            } else if level < SPEECH_RMS_THRESHOLD && in_speech {
                in_speech = false;
                log::debug!("speech offset, rms {:.4}", level);
            }

            let mut samples = pcm::to_pcm16(&samples);
            preprocessor.process(&mut samples);
            let captured = CapturedFrame {
                frame: AudioFrame::capture(samples),
                level,
            };
            match tx.try_send(captured) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // 消费端落后时丢帧，绝不阻塞采集线程
                    log::warn!("capture queue full, dropping frame");
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }
    }
}
