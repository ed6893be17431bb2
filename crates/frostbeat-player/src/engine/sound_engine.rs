//! Sound engine: narration playback via rodio
//!
//! `RodioChannel` is the device-backed `AudioChannel`. It keeps exactly one
//! sink alive; starting a clip replaces it. Clips are decoded from the bytes
//! the preloader delivered.

use std::io::Cursor;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use frostbeat_common::AudioConfig;
use frostbeat_media::wav::silent_wav;
use frostbeat_media::{AudioChannel, Clip, MediaError, SilentChannel};

/// Single narration channel on the default output device
pub struct RodioChannel {
    /// rodio output stream (must be kept alive)
    _stream: OutputStream,
    /// Handle for creating new sinks
    handle: OutputStreamHandle,
    /// The clip currently playing
    sink: Option<Sink>,
    /// Master volume (0.0 – 1.0)
    volume: f32,
}

impl RodioChannel {
    /// Open the default output device
    pub fn new(volume: f32) -> frostbeat_media::Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?;
        tracing::info!("Audio output initialized");
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            volume: volume.clamp(0.0, 1.0),
        })
    }

    fn new_sink(&self) -> frostbeat_media::Result<Sink> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?;
        sink.set_volume(self.volume);
        Ok(sink)
    }
}

impl AudioChannel for RodioChannel {
    fn unlock(&mut self) -> frostbeat_media::Result<()> {
        let source = Decoder::new(Cursor::new(silent_wav()?))
            .map_err(|e| MediaError::Unlock(e.to_string()))?;
        let sink = self.new_sink().map_err(|e| MediaError::Unlock(e.to_string()))?;
        sink.append(source);
        sink.pause();
        sink.stop();
        Ok(())
    }

    fn play(&mut self, clip: &Clip) -> frostbeat_media::Result<()> {
        let data = clip.data.clone().ok_or_else(|| MediaError::PlaybackRejected {
            audio_ref: clip.audio_ref.clone(),
            reason: "clip was not preloaded".to_string(),
        })?;
        let source = Decoder::new(Cursor::new(data)).map_err(|e| MediaError::PlaybackRejected {
            audio_ref: clip.audio_ref.clone(),
            reason: e.to_string(),
        })?;
        self.halt();
        let sink = self.new_sink()?;
        sink.append(source);
        tracing::debug!("Playing '{}'", clip.audio_ref);
        self.sink = Some(sink);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.sink.as_ref().is_some_and(|s| !s.empty())
    }

    fn halt(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

/// Pick the narration channel for this run: the output device when audio
/// is enabled and one is available, a silent channel otherwise.
pub fn open_channel(audio: &AudioConfig) -> Box<dyn AudioChannel> {
    if !audio.enabled {
        tracing::info!("Audio disabled, narration runs silently");
        return Box::new(SilentChannel::new());
    }
    match RodioChannel::new(audio.volume) {
        Ok(channel) => Box::new(channel),
        Err(e) => {
            tracing::warn!("Failed to initialize audio: {}", e);
            Box::new(SilentChannel::new())
        }
    }
}
