//! Per-scene investigation state machine
//!
//! Loading → Introducing → Exploring → AllCollected → Completed
//!
//! Owns everything that resets when a scene is entered: collected clues,
//! tutorial flags, hover, and the subtitle box. Narration goes through the
//! session's `NarrationPlayer`, which is passed in by the caller.

use std::collections::HashSet;

use frostbeat_common::Timings;
use frostbeat_media::{NarrationCue, NarrationEvent, NarrationPlayer};

use super::scenes::{Clue, Scene, TutorialTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePhase {
    /// Waiting for the preloader
    Loading,
    /// Intro narration playing, clues already clickable
    Introducing,
    Exploring,
    /// Every required clue found; continue is offered
    AllCollected,
    Completed,
}

/// Which tutorials have been enqueued in this scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TutorialFlags {
    pub first_click: bool,
    pub first_clue: bool,
    pub all_clues: bool,
}

impl TutorialFlags {
    pub fn get(&self, trigger: TutorialTrigger) -> bool {
        match trigger {
            TutorialTrigger::FirstClick => self.first_click,
            TutorialTrigger::FirstClue => self.first_clue,
            TutorialTrigger::AllClues => self.all_clues,
        }
    }

    fn set(&mut self, trigger: TutorialTrigger) {
        match trigger {
            TutorialTrigger::FirstClick => self.first_click = true,
            TutorialTrigger::FirstClue => self.first_clue = true,
            TutorialTrigger::AllClues => self.all_clues = true,
        }
    }
}

/// Result of clicking a clue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click was spent on the first-click tutorial
    Tutorial,
    Collected {
        id: String,
        count: usize,
        total: usize,
    },
    AlreadyCollected,
    /// An optional clue narrated for the first time
    OptionalHeard,
    UnknownClue,
    /// Clicks are not accepted in the current phase
    Ignored,
}

/// What the presentation layer needs to draw one clue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClueRenderState {
    pub id: String,
    pub collected: bool,
    pub hovered: bool,
    pub optional: bool,
}

pub struct Investigation {
    scene: Scene,
    phase: ScenePhase,
    /// Ids in the order they were collected
    collected: Vec<String>,
    heard_optional: HashSet<String>,
    tutorials: TutorialFlags,
    hovered: Option<String>,
    /// Cue whose completion ends the intro
    intro_cue: Option<NarrationCue>,
    narration_text: String,
    narration_visible: bool,
    default_clip_ms: u32,
    tutorial_buffer_ms: u32,
    intro_buffer_ms: u32,
}

impl Investigation {
    pub fn new(scene: &Scene, timings: &Timings) -> Self {
        let mut scene = scene.clone();
        for clue in &mut scene.clues {
            clue.collected = false;
        }
        Self {
            scene,
            phase: ScenePhase::Loading,
            collected: Vec::new(),
            heard_optional: HashSet::new(),
            tutorials: TutorialFlags::default(),
            hovered: None,
            intro_cue: None,
            narration_text: String::new(),
            narration_visible: false,
            default_clip_ms: timings.default_clip_ms(),
            tutorial_buffer_ms: timings.tutorial_buffer_ms,
            intro_buffer_ms: timings.intro_buffer_ms,
        }
    }

    /// Assets are ready: start the intro. Only valid while loading.
    pub fn begin(&mut self, narration: &mut NarrationPlayer) {
        if self.phase != ScenePhase::Loading {
            return;
        }
        let intro = self.scene.narration.intro.clone();
        let ambient = self.scene.narration.scene.clone();

        match (intro, ambient) {
            (Some(intro), ambient) => {
                self.show_text(&intro.text);
                self.intro_cue = Some(narration.play(intro.request(self.default_clip_ms)));
                if let Some(ambient) = ambient {
                    let delay = intro
                        .duration_or(self.default_clip_ms)
                        .saturating_add(self.intro_buffer_ms);
                    narration.schedule(delay, ambient.request(self.default_clip_ms));
                }
                self.phase = ScenePhase::Introducing;
            }
            (None, Some(ambient)) => {
                self.show_text(&ambient.text);
                self.intro_cue = Some(narration.play(ambient.request(self.default_clip_ms)));
                self.phase = ScenePhase::Introducing;
            }
            (None, None) => {
                let story = self.scene.story.clone();
                self.show_text(&story);
                self.phase = ScenePhase::Exploring;
            }
        }
        tracing::info!("Scene '{}' started ({:?})", self.scene.id, self.phase);

        // Nothing to find: 0 of 0 opens the continue gate right away
        if self.scene.clues.is_empty() {
            self.all_collected(self.tutorial_buffer_ms, narration);
        }
    }

    /// Feed a narration event from the shared player
    pub fn handle_narration(&mut self, event: &NarrationEvent) {
        match event {
            NarrationEvent::Started { text, .. } | NarrationEvent::Rejected { text, .. } => {
                self.show_text(text);
            }
            NarrationEvent::Finished { cue, .. } => {
                if self.intro_cue == Some(*cue) {
                    self.intro_cue = None;
                    if self.phase == ScenePhase::Introducing {
                        self.phase = ScenePhase::Exploring;
                        tracing::debug!("Intro finished, exploring '{}'", self.scene.id);
                    }
                }
            }
            NarrationEvent::QueueEmpty => {}
        }
    }

    pub fn click(&mut self, clue_id: &str, narration: &mut NarrationPlayer) -> ClickOutcome {
        if !matches!(
            self.phase,
            ScenePhase::Introducing | ScenePhase::Exploring | ScenePhase::AllCollected
        ) {
            return ClickOutcome::Ignored;
        }
        self.hovered = None;

        if let Some(optional) = self.scene.optional_clue(clue_id) {
            if !self.heard_optional.insert(optional.id.clone()) {
                return ClickOutcome::AlreadyCollected;
            }
            if let Some(n) = &optional.narration {
                narration.play(n.request(self.default_clip_ms));
            }
            tracing::debug!("Optional clue '{}' heard", clue_id);
            return ClickOutcome::OptionalHeard;
        }

        let Some(index) = self.scene.clues.iter().position(|c| c.id == clue_id) else {
            tracing::warn!("Click on unknown clue '{}'", clue_id);
            return ClickOutcome::UnknownClue;
        };
        if self.scene.clues[index].collected {
            return ClickOutcome::AlreadyCollected;
        }

        // The first click in a scene teaches how to investigate and collects nothing
        if !self.tutorials.first_click {
            self.tutorials.first_click = true;
            if let Some(tutorial) = self.scene.tutorial(TutorialTrigger::FirstClick) {
                narration.play(tutorial.narration().request(self.default_clip_ms));
                return ClickOutcome::Tutorial;
            }
        }

        self.scene.clues[index].collected = true;
        self.collected.push(clue_id.to_string());
        let count = self.collected.len();
        let total = self.scene.clues.len();
        tracing::info!("Clue collected: {} ({}/{})", clue_id, count, total);

        let clue_ms = match &self.scene.clues[index].narration {
            Some(n) => {
                narration.play(n.request(self.default_clip_ms));
                n.duration_or(self.default_clip_ms)
            }
            None => self.default_clip_ms,
        };

        let mut cursor = clue_ms.saturating_add(self.tutorial_buffer_ms);
        if count == 1 {
            cursor = self.schedule_tutorial(TutorialTrigger::FirstClue, cursor, narration);
        }
        if count == total {
            cursor = self.schedule_tutorial(TutorialTrigger::AllClues, cursor, narration);
            self.all_collected(cursor, narration);
        }

        ClickOutcome::Collected {
            id: clue_id.to_string(),
            count,
            total,
        }
    }

    /// Schedule a tutorial at `cursor` if it exists and has not fired.
    /// Returns the cursor advanced past it.
    fn schedule_tutorial(
        &mut self,
        trigger: TutorialTrigger,
        cursor: u32,
        narration: &mut NarrationPlayer,
    ) -> u32 {
        if self.tutorials.get(trigger) {
            return cursor;
        }
        let Some(tutorial) = self.scene.tutorial(trigger).map(|t| t.narration()) else {
            return cursor;
        };
        self.tutorials.set(trigger);
        narration.schedule(cursor, tutorial.request(self.default_clip_ms));
        cursor
            .saturating_add(tutorial.duration_or(self.default_clip_ms))
            .saturating_add(self.tutorial_buffer_ms)
    }

    /// Open the continue gate and queue the exit narration at `cursor`
    fn all_collected(&mut self, cursor: u32, narration: &mut NarrationPlayer) {
        if let Some(exit) = &self.scene.exit_narration {
            narration.schedule(cursor, exit.request(self.default_clip_ms));
        }
        self.phase = ScenePhase::AllCollected;
        tracing::info!("All clues found in '{}'", self.scene.id);
    }

    /// Mark a clue as hovered. Collected clues do not highlight.
    pub fn hover(&mut self, clue_id: &str) -> bool {
        let hoverable = match self.scene.clue(clue_id) {
            Some(clue) => !clue.collected,
            None => {
                self.scene.optional_clue(clue_id).is_some()
                    && !self.heard_optional.contains(clue_id)
            }
        };
        if hoverable {
            self.hovered = Some(clue_id.to_string());
        }
        hoverable
    }

    pub fn unhover(&mut self) {
        self.hovered = None;
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    /// Hide the subtitle box until the next narration starts
    pub fn dismiss_narration(&mut self) {
        self.narration_visible = false;
    }

    /// AllCollected → Completed. Returns whether the scene may be left.
    pub fn complete(&mut self) -> bool {
        if self.phase != ScenePhase::AllCollected {
            return false;
        }
        self.phase = ScenePhase::Completed;
        true
    }

    pub fn render_states(&self) -> Vec<ClueRenderState> {
        let hovered = self.hovered.as_deref();
        let required = self.scene.clues.iter().map(|c| ClueRenderState {
            id: c.id.clone(),
            collected: c.collected,
            hovered: hovered == Some(c.id.as_str()),
            optional: false,
        });
        let optional = self.scene.optional_clues.iter().map(|c| ClueRenderState {
            id: c.id.clone(),
            collected: self.heard_optional.contains(&c.id),
            hovered: hovered == Some(c.id.as_str()),
            optional: true,
        });
        required.chain(optional).collect()
    }

    /// Collected clues in the order they were found
    pub fn collected_clues(&self) -> Vec<&Clue> {
        self.collected
            .iter()
            .filter_map(|id| self.scene.clue(id))
            .collect()
    }

    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }

    pub fn total_clues(&self) -> usize {
        self.scene.clues.len()
    }

    pub fn all_found(&self) -> bool {
        self.collected.len() == self.scene.clues.len()
    }

    pub fn can_continue(&self) -> bool {
        self.phase == ScenePhase::AllCollected
    }

    pub fn phase(&self) -> ScenePhase {
        self.phase
    }

    pub fn tutorials(&self) -> TutorialFlags {
        self.tutorials
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn narration_text(&self) -> &str {
        &self.narration_text
    }

    pub fn is_narration_visible(&self) -> bool {
        self.narration_visible && !self.narration_text.is_empty()
    }

    fn show_text(&mut self, text: &str) {
        self.narration_text = text.to_string();
        self.narration_visible = true;
    }
}
