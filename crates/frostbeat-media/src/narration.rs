//! Narration player: one audio channel, one clip at a time
//!
//! Requests go into a FIFO queue drained by `update`, which the game loop
//! calls every frame. Consecutive clips are separated by a short gap.
//! Delayed requests wait in a timer list until due and then join the queue,
//! so a scheduled clip never interrupts one that is already playing.
//!
//! Completion is reported through `NarrationEvent`s keyed by the
//! `NarrationCue` that `play`/`schedule` returned.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use frostbeat_common::Timings;

use crate::channel::{AudioChannel, Clip};

/// Token identifying one narration request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NarrationCue(u64);

/// A narration to be voiced: audio reference plus the subtitle shown with it
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationRequest {
    pub audio_ref: String,
    pub text: String,
    /// Author-declared clip length
    pub duration_ms: Option<u32>,
}

impl NarrationRequest {
    pub fn new(audio_ref: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            audio_ref: audio_ref.into(),
            text: text.into(),
            duration_ms: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u32) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Events emitted by the narration player
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationEvent {
    /// A clip started playing; its text is now the active subtitle
    Started {
        cue: NarrationCue,
        audio_ref: String,
        text: String,
    },
    /// A clip finished, was rejected, or otherwise completed
    Finished { cue: NarrationCue, audio_ref: String },
    /// The runtime refused to play a clip. A `Finished` for the same cue follows.
    Rejected {
        cue: NarrationCue,
        audio_ref: String,
        text: String,
        reason: String,
    },
    /// No clip is queued any more
    QueueEmpty,
}

#[derive(Debug, Clone)]
struct QueuedNarration {
    cue: NarrationCue,
    request: NarrationRequest,
}

#[derive(Debug, Clone)]
struct ScheduledNarration {
    due_ms: u64,
    entry: QueuedNarration,
}

pub struct NarrationPlayer {
    channel: Box<dyn AudioChannel>,
    queue: VecDeque<QueuedNarration>,
    /// Delayed requests, not yet in the queue
    scheduled: Vec<ScheduledNarration>,
    current: Option<QueuedNarration>,
    /// Preloaded clip bytes keyed by audio reference
    clips: HashMap<String, Arc<[u8]>>,
    unlocked: bool,
    /// Set while the head of the queue waits for the audio unlock
    held_until: Option<u64>,
    /// Earliest time the next clip may start (end of the inter-clip gap)
    next_start_at: u64,
    now_ms: u64,
    next_cue: u64,
    clip_gap_ms: u32,
    unlock_retry_ms: u32,
    events: Vec<NarrationEvent>,
}

impl NarrationPlayer {
    pub fn new(channel: Box<dyn AudioChannel>, timings: &Timings) -> Self {
        Self {
            channel,
            queue: VecDeque::new(),
            scheduled: Vec::new(),
            current: None,
            clips: HashMap::new(),
            unlocked: false,
            held_until: None,
            next_start_at: 0,
            now_ms: 0,
            next_cue: 1,
            clip_gap_ms: timings.clip_gap_ms,
            unlock_retry_ms: timings.unlock_retry_ms,
            events: Vec::new(),
        }
    }

    /// Run the autoplay handshake. Idempotent once it has succeeded.
    /// Returns whether audio is unlocked.
    pub fn unlock(&mut self) -> bool {
        if self.unlocked {
            return true;
        }
        match self.channel.unlock() {
            Ok(()) => {
                self.unlocked = true;
                tracing::info!("Audio unlocked");
            }
            Err(e) => tracing::debug!("Audio unlock attempt failed: {}", e),
        }
        self.unlocked
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Queue a narration. It starts right away if the channel is free.
    pub fn play(&mut self, request: NarrationRequest) -> NarrationCue {
        let cue = self.alloc_cue();
        tracing::debug!("Narration queued: '{}' ({:?})", request.audio_ref, cue);
        self.queue.push_back(QueuedNarration { cue, request });
        self.pump();
        cue
    }

    /// Queue a narration `delay_ms` from now
    pub fn schedule(&mut self, delay_ms: u32, request: NarrationRequest) -> NarrationCue {
        if delay_ms == 0 {
            return self.play(request);
        }
        let cue = self.alloc_cue();
        let due_ms = self.now_ms + delay_ms as u64;
        tracing::debug!(
            "Narration scheduled: '{}' in {} ms ({:?})",
            request.audio_ref,
            delay_ms,
            cue
        );
        self.scheduled.push(ScheduledNarration {
            due_ms,
            entry: QueuedNarration { cue, request },
        });
        cue
    }

    /// Halt playback and drop every queued and scheduled narration
    pub fn stop(&mut self) {
        let dropped = self.queue.len() + self.scheduled.len();
        self.channel.halt();
        self.current = None;
        self.queue.clear();
        self.scheduled.clear();
        self.events.clear();
        self.held_until = None;
        self.next_start_at = self.now_ms;
        if dropped > 0 {
            tracing::debug!("Narration stopped, {} pending dropped", dropped);
        }
    }

    /// Whether a clip is currently playing
    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Nothing playing, queued, or scheduled
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty() && self.scheduled.is_empty()
    }

    pub fn current_cue(&self) -> Option<NarrationCue> {
        self.current.as_ref().map(|c| c.cue)
    }

    pub fn current_text(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.request.text.as_str())
    }

    /// Number of requests waiting in the queue (excludes scheduled ones)
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of requests waiting for their timer
    pub fn scheduled(&self) -> usize {
        self.scheduled.len()
    }

    /// Hand over preloaded clip bytes for the upcoming scene
    pub fn set_clips(&mut self, clips: HashMap<String, Arc<[u8]>>) {
        self.clips = clips;
    }

    pub fn clear_clips(&mut self) {
        self.clips.clear();
    }

    /// Advance by `dt_ms`. Call once per frame.
    pub fn update(&mut self, dt_ms: u32) -> Vec<NarrationEvent> {
        self.now_ms += dt_ms as u64;
        self.channel.update(dt_ms);
        self.fire_due_timers();

        if self.current.is_some() && !self.channel.is_playing() {
            if let Some(done) = self.current.take() {
                tracing::debug!("Narration finished: '{}'", done.request.audio_ref);
                self.events.push(NarrationEvent::Finished {
                    cue: done.cue,
                    audio_ref: done.request.audio_ref,
                });
                self.next_start_at = self.now_ms + self.clip_gap_ms as u64;
                if self.queue.is_empty() {
                    self.events.push(NarrationEvent::QueueEmpty);
                }
            }
        }

        self.pump();
        std::mem::take(&mut self.events)
    }

    fn alloc_cue(&mut self) -> NarrationCue {
        let cue = NarrationCue(self.next_cue);
        self.next_cue += 1;
        cue
    }

    fn fire_due_timers(&mut self) {
        if self.scheduled.is_empty() {
            return;
        }
        self.scheduled.sort_by_key(|s| (s.due_ms, s.entry.cue));
        let now = self.now_ms;
        let due = self.scheduled.iter().take_while(|s| s.due_ms <= now).count();
        for s in self.scheduled.drain(..due) {
            tracing::debug!("Narration timer fired: '{}'", s.entry.request.audio_ref);
            self.queue.push_back(s.entry);
        }
    }

    /// Start the head of the queue if the channel is free
    fn pump(&mut self) {
        if self.current.is_some() || self.queue.is_empty() || self.now_ms < self.next_start_at {
            return;
        }

        if !self.unlocked {
            match self.held_until {
                None => {
                    if !self.unlock() {
                        self.held_until = Some(self.now_ms + self.unlock_retry_ms as u64);
                        tracing::debug!("Narration held until audio unlocks");
                        return;
                    }
                }
                Some(until) if self.now_ms < until => return,
                Some(_) => {
                    // Hold expired: retry once, then play regardless
                    self.unlock();
                }
            }
        }
        self.held_until = None;

        let Some(entry) = self.queue.pop_front() else {
            return;
        };
        let clip = Clip {
            audio_ref: entry.request.audio_ref.clone(),
            data: self.clips.get(&entry.request.audio_ref).cloned(),
            duration_ms: entry.request.duration_ms,
        };

        match self.channel.play(&clip) {
            Ok(()) => {
                tracing::debug!("Narration started: '{}'", clip.audio_ref);
                self.events.push(NarrationEvent::Started {
                    cue: entry.cue,
                    audio_ref: clip.audio_ref,
                    text: entry.request.text.clone(),
                });
                self.current = Some(entry);
            }
            Err(e) => {
                tracing::warn!("Narration playback rejected: {}", e);
                self.events.push(NarrationEvent::Rejected {
                    cue: entry.cue,
                    audio_ref: clip.audio_ref.clone(),
                    text: entry.request.text.clone(),
                    reason: e.to_string(),
                });
                self.events.push(NarrationEvent::Finished {
                    cue: entry.cue,
                    audio_ref: clip.audio_ref,
                });
                self.next_start_at = self.now_ms + self.clip_gap_ms as u64;
                if self.queue.is_empty() {
                    self.events.push(NarrationEvent::QueueEmpty);
                }
            }
        }
    }
}
