//! Session bring-up and the loop that drives the controller.
//!
//! `VoiceSession::connect` opens every device and the transport before
//! returning, so startup failures land on the caller as plain errors while
//! nothing is half-running. After that a single task owns the controller
//! and feeds it until the session ends.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::audio::pcm::PLAYBACK_SAMPLE_RATE;
use crate::audio::{AlsaSink, Capture, CapturedFrame, Player};
use crate::config::Config;
use crate::controller::Controller;
use crate::events::UiEvent;
use crate::link::{Link, LinkEvent};
use crate::state::SessionState;

/// 采集帧队列深度，约一秒积压后开始丢帧
const FRAME_QUEUE_DEPTH: usize = 8;

/// Handle to a live conversation. Dropping it also shuts the session down,
/// but `disconnect` is the orderly path.
pub struct VoiceSession {
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl VoiceSession {
    pub async fn connect(
        config: &Config,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Result<Self> {
        log::info!("session {}", SessionState::Connecting);
        match Self::bring_up(config, ui_tx).await {
            Ok(session) => Ok(session),
            Err(e) => {
                log::error!("session {}", SessionState::Error);
                Err(e)
            }
        }
    }

    async fn bring_up(
        config: &Config,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Result<Self> {
        let (link_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, link_events) = mpsc::unbounded_channel();
        let link = Link::connect(config.ws_url, event_tx, cmd_rx).await?;
        log::info!("session {}", SessionState::Ready);

        let sink = AlsaSink::open(
            config.playback_device,
            PLAYBACK_SAMPLE_RATE,
            config.playback_period,
        )
        .context("failed to open playback device")?;
        let player = Player::start(sink, ui_tx.clone())?;

        let (frame_tx, frames) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let capture = Capture::start(config.capture_device, frame_tx)?;

        tokio::spawn(link.run());
        let controller = Controller::new(player, link_tx, ui_tx);
        log::info!("session {}", controller.state());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let driver = tokio::spawn(drive(controller, capture, link_events, frames, shutdown_rx));
        Ok(Self {
            shutdown: Some(shutdown_tx),
            driver: Some(driver),
        })
    }

    /// Orderly shutdown. Waits until the drive task has wound everything
    /// down.
    pub async fn disconnect(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn drive(
    mut controller: Controller,
    mut capture: Capture,
    mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
    mut frames: mpsc::Receiver<CapturedFrame>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut capture_alive = true;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                controller.disconnect();
                break;
            }
            event = link_events.recv() => {
                let event = event.unwrap_or(LinkEvent::Closed {
                    reason: "link task ended".to_string(),
                });
                if controller.handle_link_event(event) {
                    break;
                }
            }
            frame = frames.recv(), if capture_alive => {
                match frame {
                    Some(frame) => controller.handle_frame(frame),
                    None => {
                        // 采集线程已退出，会话转为只听模式
                        log::warn!("capture side ended, session continues playback only");
                        capture_alive = false;
                    }
                }
            }
        }
    }
    capture.stop();
}
