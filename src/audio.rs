//! Audio playback boundary

use crate::error::AudioError;

/// Plays clips referenced by audio-trigger markers. Failures are reported
/// back but never stop the viewer.
pub trait AudioPlayer: Send {
    fn play(&mut self, audio_ref: &str) -> Result<(), AudioError>;
}

/// Player for hosts without audio output; records the request in the log
#[derive(Debug, Default)]
pub struct LogOnlyPlayer;

impl AudioPlayer for LogOnlyPlayer {
    fn play(&mut self, audio_ref: &str) -> Result<(), AudioError> {
        if audio_ref.trim().is_empty() {
            return Err(AudioError::new(audio_ref, "empty audio reference"));
        }
        log::info!("Audio requested: {audio_ref}");
        Ok(())
    }
}
