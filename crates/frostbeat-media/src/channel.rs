//! The playback primitive behind the narration queue
//!
//! An `AudioChannel` plays one clip at a time. It knows nothing about
//! queueing or scheduling; `NarrationPlayer` is its only caller.

use std::sync::Arc;

use crate::Result;

/// A clip handed to the channel for playback
#[derive(Debug, Clone)]
pub struct Clip {
    /// Opaque audio reference (path or URL)
    pub audio_ref: String,
    /// Preloaded bytes, if the preloader delivered them
    pub data: Option<Arc<[u8]>>,
    /// Author-declared length of the clip
    pub duration_ms: Option<u32>,
}

/// Single playback channel
pub trait AudioChannel {
    /// One-time autoplay handshake (play then pause a silent clip)
    fn unlock(&mut self) -> Result<()>;

    /// Start playing `clip`, replacing whatever was playing.
    /// An error means the runtime rejected playback.
    fn play(&mut self, clip: &Clip) -> Result<()>;

    /// Whether the last started clip is still audible
    fn is_playing(&self) -> bool;

    /// Stop playback and rewind
    fn halt(&mut self);

    /// Advance channel-internal time. Device-backed channels ignore this.
    fn update(&mut self, _dt_ms: u32) {}
}

/// Channel used when no audio output is available.
///
/// Each clip "plays" silently for its declared duration so narration
/// pacing matches what a listener would hear.
#[derive(Debug, Default)]
pub struct SilentChannel {
    remaining_ms: Option<u32>,
}

impl SilentChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioChannel for SilentChannel {
    fn unlock(&mut self) -> Result<()> {
        Ok(())
    }

    fn play(&mut self, clip: &Clip) -> Result<()> {
        tracing::debug!("Silent playback of '{}'", clip.audio_ref);
        self.remaining_ms = Some(clip.duration_ms.unwrap_or(0));
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.remaining_ms.is_some_and(|ms| ms > 0)
    }

    fn halt(&mut self) {
        self.remaining_ms = None;
    }

    fn update(&mut self, dt_ms: u32) {
        if let Some(ms) = &mut self.remaining_ms {
            *ms = ms.saturating_sub(dt_ms);
        }
    }
}
