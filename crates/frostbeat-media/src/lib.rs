//! Media handling for narration and scene assets
//!
//! This crate handles:
//! - A single serialized narration channel (FIFO queue, scheduled clips,
//!   autoplay unlock handshake)
//! - Concurrent asset preloading with per-batch progress and stale-result
//!   suppression
//! - The silent WAV clip used to unlock audio output

pub mod channel;
pub mod mock;
pub mod narration;
pub mod preload;
pub mod wav;

use thiserror::Error;

pub use channel::{AudioChannel, Clip, SilentChannel};
pub use narration::{NarrationCue, NarrationEvent, NarrationPlayer, NarrationRequest};
pub use preload::{
    AssetKind, AssetLoader, AssetManifest, AssetPreloader, LoadFailure, LoadedAssets,
    PreloadProgress, PreloadToken,
};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Failed to decode {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("Asset load timed out: {0}")]
    TimedOut(String),

    #[error("Playback rejected for {audio_ref}: {reason}")]
    PlaybackRejected { audio_ref: String, reason: String },

    #[error("Audio unlock failed: {0}")]
    Unlock(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;
