//! Mock audio channel for testing
//!
//! Clips "play" for their declared duration on a virtual clock advanced by
//! `update`. Every start and stop is recorded so tests can check ordering
//! and overlap. Clones share state: keep one clone as a probe and hand the
//! other to the player.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::channel::{AudioChannel, Clip};
use crate::{MediaError, Result};

/// One recorded playback
#[derive(Debug, Clone, PartialEq)]
pub struct MockPlay {
    pub audio_ref: String,
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub halted: bool,
    /// Whether preloaded bytes came with the clip
    pub had_data: bool,
}

#[derive(Debug, Default)]
struct MockState {
    now_ms: u64,
    remaining_ms: Option<u32>,
    plays: Vec<MockPlay>,
    rejected_refs: HashSet<String>,
    reject_unlock: bool,
    unlock_calls: usize,
    unlocked: bool,
}

impl MockState {
    fn end_current(&mut self, halted: bool) {
        if self.remaining_ms.take().is_some() {
            let now = self.now_ms;
            if let Some(last) = self.plays.last_mut() {
                last.ended_at = Some(now);
                last.halted = halted;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Rc<RefCell<MockState>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `play` of `audio_ref` fail
    pub fn reject(&self, audio_ref: &str) {
        self.state.borrow_mut().rejected_refs.insert(audio_ref.to_string());
    }

    /// Make the unlock handshake fail (autoplay blocked)
    pub fn reject_unlock(&self, reject: bool) {
        self.state.borrow_mut().reject_unlock = reject;
    }

    /// End the current clip now, as if it reached its end
    pub fn finish(&self) {
        self.state.borrow_mut().end_current(false);
    }

    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }

    pub fn unlock_calls(&self) -> usize {
        self.state.borrow().unlock_calls
    }

    pub fn is_unlocked(&self) -> bool {
        self.state.borrow().unlocked
    }

    pub fn plays(&self) -> Vec<MockPlay> {
        self.state.borrow().plays.clone()
    }

    /// Audio refs in the order playback started
    pub fn started(&self) -> Vec<String> {
        self.state
            .borrow()
            .plays
            .iter()
            .map(|p| p.audio_ref.clone())
            .collect()
    }

    /// True when every clip ended before the next one started
    pub fn is_overlap_free(&self) -> bool {
        let state = self.state.borrow();
        state.plays.windows(2).all(|pair| match pair[0].ended_at {
            Some(end) => end <= pair[1].started_at,
            None => false,
        })
    }
}

impl AudioChannel for MockChannel {
    fn unlock(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.unlock_calls += 1;
        if state.reject_unlock {
            return Err(MediaError::Unlock("autoplay blocked".to_string()));
        }
        state.unlocked = true;
        Ok(())
    }

    fn play(&mut self, clip: &Clip) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.rejected_refs.contains(&clip.audio_ref) {
            return Err(MediaError::PlaybackRejected {
                audio_ref: clip.audio_ref.clone(),
                reason: "mock rejection".to_string(),
            });
        }
        state.end_current(true);
        let now = state.now_ms;
        state.plays.push(MockPlay {
            audio_ref: clip.audio_ref.clone(),
            started_at: now,
            ended_at: None,
            halted: false,
            had_data: clip.data.is_some(),
        });
        state.remaining_ms = Some(clip.duration_ms.unwrap_or(0));
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.borrow().remaining_ms.is_some_and(|ms| ms > 0)
    }

    fn halt(&mut self) {
        self.state.borrow_mut().end_current(true);
    }

    fn update(&mut self, dt_ms: u32) {
        let mut state = self.state.borrow_mut();
        state.now_ms += dt_ms as u64;
        if let Some(ms) = state.remaining_ms {
            let left = ms.saturating_sub(dt_ms);
            if left == 0 {
                state.end_current(false);
            } else {
                state.remaining_ms = Some(left);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str, ms: u32) -> Clip {
        Clip {
            audio_ref: name.to_string(),
            data: None,
            duration_ms: Some(ms),
        }
    }

    #[test]
    fn records_start_and_end() {
        let probe = MockChannel::new();
        let mut ch = probe.clone();
        ch.play(&clip("a", 100)).unwrap();
        ch.update(100);
        assert!(!ch.is_playing());
        let plays = probe.plays();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].started_at, 0);
        assert_eq!(plays[0].ended_at, Some(100));
        assert!(!plays[0].halted);
    }

    #[test]
    fn replacing_a_clip_counts_as_halt() {
        let mut ch = MockChannel::new();
        ch.play(&clip("a", 1000)).unwrap();
        ch.update(10);
        ch.play(&clip("b", 1000)).unwrap();
        let plays = ch.plays();
        assert!(plays[0].halted);
        assert_eq!(plays[0].ended_at, Some(10));
    }

    #[test]
    fn rejection() {
        let mut ch = MockChannel::new();
        ch.reject("bad");
        assert!(ch.play(&clip("bad", 10)).is_err());
        assert!(ch.plays().is_empty());

        ch.reject_unlock(true);
        assert!(ch.unlock().is_err());
        assert!(!ch.is_unlocked());
        assert_eq!(ch.unlock_calls(), 1);
    }
}
