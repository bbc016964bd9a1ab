//! Session controller: every protocol and audio event lands here.
//!
//! The controller is plain sequential code driven from one task, so state
//! transitions never race. It owns the playback queue outright; the link and
//! capture sides only talk to it through channels.

use tokio::sync::mpsc;

use crate::audio::pcm::{self, AudioFrame};
use crate::audio::{CapturedFrame, Player};
use crate::events::{Role, Sentiment, UiEvent};
use crate::link::{LinkCommand, LinkEvent};
use crate::protocol::{ClientMessage, ServerEvent};
use crate::state::SessionState;

pub struct Controller {
    state: SessionState,
    player: Player,
    link_tx: mpsc::UnboundedSender<LinkCommand>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
}

impl Controller {
    /// The caller hands over a connected link and a running player, so the
    /// session starts out streaming.
    pub fn new(
        player: Player,
        link_tx: mpsc::UnboundedSender<LinkCommand>,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            state: SessionState::Streaming,
            player,
            link_tx,
            ui_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Forward one capture frame to the agent.
    pub fn handle_frame(&mut self, frame: CapturedFrame) {
        if self.state != SessionState::Streaming {
            return;
        }
        log::trace!("capture frame, rms {:.4}", frame.level);
        let audio = pcm::encode_base64(&frame.frame.samples);
        self.send_message(&ClientMessage::AppendAudio { audio });
    }

    /// Returns true when the session is over and the caller should stop
    /// driving it.
    pub fn handle_link_event(&mut self, event: LinkEvent) -> bool {
        match event {
            LinkEvent::Message(text) => {
                self.process_server_text(&text);
                false
            }
            LinkEvent::Closed { reason } => {
                self.finish(Some(reason));
                true
            }
        }
    }

    /// Orderly teardown on caller request.
    pub fn disconnect(&mut self) {
        self.finish(None);
    }

    fn process_server_text(&mut self, text: &str) {
        let (event, tag) = match ServerEvent::parse(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                // 非法消息只记录，会话继续
                log::warn!("dropping malformed server message: {}", e);
                return;
            }
        };

        match event {
            ServerEvent::SessionCreated {} | ServerEvent::SessionUpdated {} => {
                log::debug!("session acknowledged: {}", tag);
            }
            ServerEvent::AudioDelta { delta } => self.enqueue_delta(&delta),
            ServerEvent::AudioDone {} => {
                log::debug!("agent finished sending audio");
            }
            ServerEvent::ResponseDone {} => {
                log::debug!("agent response complete");
            }
            ServerEvent::TranscriptDone { text, transcript } => {
                let line = text.or(transcript).unwrap_or_default();
                if !line.is_empty() {
                    self.send_ui(UiEvent::Transcript {
                        role: Role::Assistant,
                        text: line,
                    });
                }
            }
            ServerEvent::ItemCreated { item } => {
                if let Some(text) = item.transcript() {
                    self.send_ui(UiEvent::Transcript {
                        role: Role::from_label(&item.role),
                        text: text.to_string(),
                    });
                }
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                if !transcript.is_empty() {
                    self.send_ui(UiEvent::Transcript {
                        role: Role::User,
                        text: transcript,
                    });
                }
            }
            ServerEvent::SpeechStarted {} => self.interrupt(),
            ServerEvent::SpeechStopped {} => {
                log::debug!("server detected end of user speech");
            }
            ServerEvent::SentimentUpdate { sentiment } => {
                self.send_ui(UiEvent::Sentiment(Sentiment::from_label(&sentiment)));
            }
            ServerEvent::Error { error } => {
                // 服务端可恢复错误，不终止会话
                log::warn!("server reported error: {:?}", error);
            }
            ServerEvent::Unknown => {
                log::debug!("ignoring unknown event type: {}", tag);
            }
        }
    }

    fn enqueue_delta(&mut self, delta: &str) {
        match pcm::decode_base64(delta) {
            Ok(samples) => self.player.enqueue(AudioFrame::playback(samples)),
            Err(e) => {
                // 坏帧跳过，后续帧照常播放
                log::warn!("skipping undecodable audio delta: {:#}", e);
            }
        }
    }

    /// User barge-in. Local audio dies first so the interruption lands
    /// immediately even though the cancel takes a round trip.
    fn interrupt(&mut self) {
        log::info!("user speech started, interrupting playback");
        self.player.flush();
        self.send_message(&ClientMessage::CancelResponse);
    }

    /// Terminal teardown. Safe to call more than once; only the first call
    /// does anything.
    fn finish(&mut self, unexpected: Option<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.player.flush();
        self.player.stop();
        let _ = self.link_tx.send(LinkCommand::Close);
        self.state = SessionState::Closed;
        log::info!("session {}", self.state);
        if let Some(reason) = unexpected {
            self.send_ui(UiEvent::Fatal(reason));
        }
    }

    fn send_message(&mut self, msg: &ClientMessage) {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                log::error!("failed to encode client message: {}", e);
                return;
            }
        };
        if self.link_tx.send(LinkCommand::Send(json)).is_err() {
            log::warn!("link command channel closed, dropping outbound message");
        }
    }

    fn send_ui(&self, event: UiEvent) {
        let _ = self.ui_tx.send(event);
    }
}
