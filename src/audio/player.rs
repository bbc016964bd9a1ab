//! Ordered playback of streamed agent audio with atomic flush for barge-in.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::device;
use super::pcm::{AudioFrame, PLAYBACK_SAMPLE_RATE};
use crate::events::UiEvent;

/// Where rendered samples go. The real sink is an ALSA device; tests
/// substitute memory.
pub trait PcmSink: Send {
    /// Preferred write granularity in samples. Flushes take effect between
    /// writes of this size.
    fn chunk_samples(&self) -> usize;
    /// Block until the samples are handed to the device.
    fn write(&mut self, samples: &[i16]) -> Result<()>;
    /// Throw away whatever the device still has buffered.
    fn discard(&mut self);
}

/// `PcmSink` backed by an ALSA playback device.
pub struct AlsaSink {
    pcm: alsa::pcm::PCM,
    period: usize,
}

impl AlsaSink {
    pub fn open(device_name: &str, sample_rate: u32, period: usize) -> Result<Self> {
        let (pcm, params) = device::open_playback(device_name, sample_rate, Some(period))?;
        Ok(Self { pcm, period: params.period_size })
    }
}

impl PcmSink for AlsaSink {
    fn chunk_samples(&self) -> usize {
        self.period
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let io = self.pcm.io_i16()?;
        let mut written = 0;
        let mut retries = 0u32;
        while written < samples.len() {
            match io.writei(&samples[written..]) {
                Ok(n) => {
                    written += n;
                    retries = 0;
                }
                Err(e) => {
                    log::warn!("ALSA playback error: {}, recovering...", e);
                    self.pcm
                        .prepare()
                        .context("failed to recover playback device")?;
                    retries += 1;
                    // 熔断器：底层持续跟不上写入速度时，丢弃剩余样本防止死循环
                    if retries >= 3 {
                        log::error!(
                            "playback device keeps failing, dropping {} samples",
                            samples.len() - written
                        );
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        // snd_pcm_drop throws away what the device still buffers
        if let Err(e) = self.pcm.drop() {
            log::debug!("pcm drop failed: {}", e);
        }
        if let Err(e) = self.pcm.prepare() {
            log::warn!("pcm prepare after drop failed: {}", e);
        }
    }
}

struct QueueState {
    frames: VecDeque<AudioFrame>,
    rendering: bool,
    speaking: bool,
    epoch: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    frame_ready: Condvar,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recompute the derived speaking flag and publish it on change. Callers
    /// hold the lock, so publications are totally ordered.
    fn update_speaking(&self, st: &mut QueueState) {
        let speaking = !st.frames.is_empty() || st.rendering;
        if speaking != st.speaking {
            st.speaking = speaking;
            let _ = self.ui_tx.send(UiEvent::Speaking(speaking));
        }
    }
}

/// FIFO frame queue with a single render thread.
///
/// The head frame stays queued while it renders and is popped only when its
/// rendering completes. `flush` bumps an epoch counter that the render thread
/// checks between chunks, so an in-flight frame is cut short without ever
/// reordering or replaying audio.
pub struct Player {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Player {
    pub fn start<S: PcmSink + 'static>(
        sink: S,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                rendering: false,
                speaking: false,
                epoch: 0,
                shutdown: false,
            }),
            frame_ready: Condvar::new(),
            ui_tx,
        });
        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name("voice-playback".into())
            .spawn(move || render_loop(worker, sink))
            .context("failed to spawn playback thread")?;
        Ok(Self { shared, handle: Some(handle) })
    }

    /// Append one frame; it renders as soon as the render thread is free.
    /// The queue only accepts frames in the playback clock domain.
    pub fn enqueue(&self, frame: AudioFrame) {
        if frame.sample_rate != PLAYBACK_SAMPLE_RATE {
            log::warn!(
                "dropping {} Hz frame, playback runs at {} Hz",
                frame.sample_rate,
                PLAYBACK_SAMPLE_RATE
            );
            return;
        }
        let mut st = self.shared.lock();
        if st.shutdown {
            return;
        }
        st.frames.push_back(frame);
        self.shared.update_speaking(&mut st);
        self.shared.frame_ready.notify_one();
    }

    /// Drop everything, including the frame currently rendering. An enqueue
    /// racing this call either lands before it and is discarded, or after it
    /// and plays as the start of the next utterance.
    pub fn flush(&self) {
        let mut st = self.shared.lock();
        st.frames.clear();
        st.epoch = st.epoch.wrapping_add(1);
        st.rendering = false;
        self.shared.update_speaking(&mut st);
    }

    /// Stop the render thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut st = self.shared.lock();
            st.shutdown = true;
            st.frames.clear();
            st.epoch = st.epoch.wrapping_add(1);
            st.rendering = false;
            self.shared.update_speaking(&mut st);
            self.shared.frame_ready.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    fn probe(&self) -> (usize, bool) {
        let st = self.shared.lock();
        (st.frames.len(), st.rendering)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop<S: PcmSink>(shared: Arc<Shared>, mut sink: S) {
    loop {
        // wait for a head frame
        let (samples, my_epoch) = {
            let mut st = shared.lock();
            loop {
                if st.shutdown {
                    return;
                }
                if let Some(front) = st.frames.front() {
                    let samples = front.samples.clone();
                    st.rendering = true;
                    break (samples, st.epoch);
                }
                st = match shared.frame_ready.wait(st) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        };

        // write chunk-wise without the lock so a flush can cut in
        let chunk = sink.chunk_samples().max(1);
        let mut interrupted = false;
        for piece in samples.chunks(chunk) {
            if shared.lock().epoch != my_epoch {
                interrupted = true;
                break;
            }
            if let Err(e) = sink.write(piece) {
                // skip the rest of this frame, keep the queue going
                log::error!("playback write failed: {}", e);
                break;
            }
        }

        let mut st = shared.lock();
        if interrupted || st.epoch != my_epoch {
            // flushed or stopped mid-frame: nothing to pop, the queue was
            // already cleared under this epoch bump
            drop(st);
            sink.discard();
            continue;
        }
        st.frames.pop_front();
        st.rendering = false;
        shared.update_speaking(&mut st);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySink;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn wait_until(timeout_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn speaking_events(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<bool> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let UiEvent::Speaking(on) = event {
                seen.push(on);
            }
        }
        seen
    }

    #[test]
    fn renders_frames_in_enqueue_order() {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (sink, written, _discards) = MemorySink::new(64, Duration::from_millis(5));
        let mut player = Player::start(sink, ui_tx).unwrap();

        let first: Vec<i16> = (0i16..256).collect();
        let second: Vec<i16> = (1000i16..1256).collect();
        player.enqueue(AudioFrame::playback(first.clone()));
        player.enqueue(AudioFrame::playback(second.clone()));

        assert!(wait_until(2000, || written.lock().unwrap().len() == 512));
        assert!(wait_until(2000, || player.probe() == (0, false)));
        player.stop();

        let mut expected = first;
        expected.extend(second);
        assert_eq!(*written.lock().unwrap(), expected);
        assert_eq!(speaking_events(&mut ui_rx), vec![true, false]);
    }

    #[test]
    fn head_frame_stays_queued_while_rendering() {
        let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
        let (sink, written, _discards) = MemorySink::new(32, Duration::from_millis(5));
        let mut player = Player::start(sink, ui_tx).unwrap();

        player.enqueue(AudioFrame::playback(vec![7i16; 3200]));
        assert!(wait_until(2000, || !written.lock().unwrap().is_empty()));
        assert_eq!(player.probe(), (1, true));

        assert!(wait_until(5000, || player.probe() == (0, false)));
        assert_eq!(written.lock().unwrap().len(), 3200);
        player.stop();
    }

    #[test]
    fn flush_mid_render_discards_the_remainder() {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (sink, written, discards) = MemorySink::new(32, Duration::from_millis(5));
        let mut player = Player::start(sink, ui_tx).unwrap();

        player.enqueue(AudioFrame::playback(vec![1i16; 6400]));
        assert!(wait_until(2000, || !written.lock().unwrap().is_empty()));

        player.flush();
        assert_eq!(player.probe(), (0, false));
        assert!(wait_until(2000, || discards.load(Ordering::SeqCst) == 1));

        let len_after_flush = written.lock().unwrap().len();
        assert!(len_after_flush < 6400);

        // whatever comes next plays normally
        player.enqueue(AudioFrame::playback(vec![42i16; 64]));
        assert!(wait_until(2000, || {
            written.lock().unwrap().len() == len_after_flush + 64
        }));
        let got = written.lock().unwrap().clone();
        assert_eq!(&got[len_after_flush..], &[42i16; 64][..]);
        player.stop();

        assert_eq!(speaking_events(&mut ui_rx), vec![true, false, true, false]);
    }

    #[test]
    fn frames_from_the_capture_clock_are_rejected() {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (sink, written, _discards) = MemorySink::new(32, Duration::from_millis(1));
        let mut player = Player::start(sink, ui_tx).unwrap();

        player.enqueue(AudioFrame::capture(vec![5i16; 64]));
        assert_eq!(player.probe(), (0, false));
        assert!(speaking_events(&mut ui_rx).is_empty());
        assert!(written.lock().unwrap().is_empty());
        player.stop();
    }

    #[test]
    fn flush_with_empty_queue_is_quiet() {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (sink, _written, discards) = MemorySink::new(32, Duration::from_millis(1));
        let mut player = Player::start(sink, ui_tx).unwrap();

        player.flush();
        assert_eq!(player.probe(), (0, false));
        assert_eq!(speaking_events(&mut ui_rx), Vec::<bool>::new());
        assert_eq!(discards.load(Ordering::SeqCst), 0);
        player.stop();
    }
}
