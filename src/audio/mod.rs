//! audio - capture, playback, and PCM codec library
//!
//! Uses ALSA for audio I/O and SpeexDSP for noise suppression and AGC.
//! Capture runs at 16 kHz, playback at 24 kHz; the two sides never share
//! a clock and nothing here resamples.

mod capture;
mod device;
pub mod pcm;
mod player;
mod speex;

pub use capture::{Capture, CapturedFrame};
pub use player::{AlsaSink, Player};

#[cfg(test)]
pub(crate) use player::testing;
