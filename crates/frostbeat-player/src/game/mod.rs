//! Game logic: scene table, investigation state machine, session progression
//!
//! `GameSession` owns the top-level screen (menu or game), the current scene
//! index, the two-phase screen fade, the narration player and the asset
//! preloader. Every mutation goes through one of its commands; the front-end
//! calls `update` once per frame and renders from the accessors.

pub mod investigation;
pub mod scenes;

use std::collections::HashMap;
use std::sync::Arc;

use frostbeat_common::Timings;
use frostbeat_media::{
    AssetLoader, AssetPreloader, AudioChannel, NarrationEvent, NarrationPlayer, PreloadProgress,
};

use crate::game::investigation::{ClickOutcome, Investigation, ScenePhase};
use crate::game::scenes::{SceneSlot, SceneTable};

/// Top-level screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Menu,
    Game,
}

/// Screen fade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeState {
    /// Fading in or fully visible
    In,
    /// Fading out towards a screen swap
    Out,
}

/// What the session shows once a fade-out completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapTarget {
    /// Enter the game at scene 0
    Game,
    /// Back to the menu, progress reset
    Menu,
}

/// A pending screen swap: counts down, then swaps while fully faded out
#[derive(Debug, Clone, Copy)]
struct ScreenTransition {
    remaining_ms: u32,
    target: SwapTarget,
}

/// Notifications for the front-end, produced by `update` and commands
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ScreenChanged(Screen),
    LoadingProgress(PreloadProgress),
    SceneReady { index: usize, title: String },
    /// A narration clip started; its text is the subtitle
    NarrationShown(String),
    ClueCollected {
        id: String,
        count: usize,
        total: usize,
    },
    /// Every clue found; continue is now enabled
    ContinueAvailable,
    Victory,
    /// The scene index points at a missing or malformed scene
    NoScene(usize),
}

pub struct GameSession {
    scenes: SceneTable,
    narration: NarrationPlayer,
    preloader: AssetPreloader,
    timings: Timings,
    screen: Screen,
    fade: FadeState,
    transition: Option<ScreenTransition>,
    /// Time left of the current fade-in
    fade_in_ms: u32,
    scene_index: usize,
    investigation: Option<Investigation>,
    loading: Option<PreloadProgress>,
    /// Decoded-and-verified texture bytes for the current scene
    textures: HashMap<String, Arc<[u8]>>,
    /// Events raised by commands, flushed on the next `update`
    pending: Vec<SessionEvent>,
}

impl GameSession {
    pub fn new(
        scenes: SceneTable,
        channel: Box<dyn AudioChannel>,
        loader: Arc<dyn AssetLoader>,
        timings: &Timings,
    ) -> Self {
        tracing::info!("GameSession initialized: {} scene slot(s)", scenes.len());
        Self {
            scenes,
            narration: NarrationPlayer::new(channel, timings),
            preloader: AssetPreloader::new(loader).with_timeout(timings.load_timeout_ms),
            timings: timings.clone(),
            screen: Screen::Menu,
            fade: FadeState::In,
            transition: None,
            fade_in_ms: 0,
            scene_index: 0,
            investigation: None,
            loading: None,
            textures: HashMap::new(),
            pending: Vec::new(),
        }
    }

    // ---- Commands ----

    /// Menu "Start Game". Doubles as the user gesture that unlocks audio.
    pub fn start_game(&mut self) -> bool {
        if self.screen != Screen::Menu || self.transition.is_some() {
            return false;
        }
        self.narration.unlock();
        self.begin_fade(SwapTarget::Game);
        true
    }

    pub fn click_clue(&mut self, clue_id: &str) -> ClickOutcome {
        if !self.accepts_input() {
            return ClickOutcome::Ignored;
        }
        let Some(inv) = &mut self.investigation else {
            return ClickOutcome::Ignored;
        };
        let outcome = inv.click(clue_id, &mut self.narration);
        if let ClickOutcome::Collected { id, count, total } = &outcome {
            self.pending.push(SessionEvent::ClueCollected {
                id: id.clone(),
                count: *count,
                total: *total,
            });
            if inv.can_continue() {
                self.pending.push(SessionEvent::ContinueAvailable);
            }
        }
        outcome
    }

    pub fn hover_clue(&mut self, clue_id: &str) -> bool {
        if !self.accepts_input() {
            return false;
        }
        self.investigation
            .as_mut()
            .is_some_and(|inv| inv.hover(clue_id))
    }

    pub fn unhover_clue(&mut self) {
        if let Some(inv) = &mut self.investigation {
            inv.unhover();
        }
    }

    pub fn dismiss_narration(&mut self) {
        if let Some(inv) = &mut self.investigation {
            inv.dismiss_narration();
        }
    }

    /// "Continue" after every clue is found. Advances the scene index.
    pub fn continue_to_next(&mut self) -> bool {
        if !self.accepts_input() {
            return false;
        }
        let Some(inv) = &mut self.investigation else {
            return false;
        };
        if !inv.complete() {
            return false;
        }
        tracing::info!("Scene {} completed", self.scene_index);
        self.scene_index += 1;
        self.enter_scene(self.scene_index);
        true
    }

    /// Back to the menu. Progress and scene-local state are reset.
    pub fn return_to_menu(&mut self) -> bool {
        if self.screen != Screen::Game || self.transition.is_some() {
            return false;
        }
        self.narration.stop();
        self.preloader.cancel();
        self.begin_fade(SwapTarget::Menu);
        true
    }

    /// Victory "Play Again": throw the whole session state away
    pub fn play_again(&mut self) -> bool {
        if !self.is_victory() || self.transition.is_some() {
            return false;
        }
        tracing::info!("Restarting session");
        self.reset();
        self.screen = Screen::Menu;
        self.fade = FadeState::In;
        self.fade_in_ms = self.timings.fade_ms;
        self.pending.push(SessionEvent::ScreenChanged(Screen::Menu));
        true
    }

    /// Advance the session by `dt_ms`. Call once per frame.
    pub fn update(&mut self, dt_ms: u32) -> Vec<SessionEvent> {
        let mut events = std::mem::take(&mut self.pending);

        self.fade_in_ms = self.fade_in_ms.saturating_sub(dt_ms);
        if let Some(trans) = &mut self.transition {
            trans.remaining_ms = trans.remaining_ms.saturating_sub(dt_ms);
            if trans.remaining_ms == 0 {
                let target = trans.target;
                self.transition = None;
                self.swap_screen(target);
                events.append(&mut self.pending);
            }
        }

        self.poll_preloader(dt_ms, &mut events);

        for event in self.narration.update(dt_ms) {
            if let Some(inv) = &mut self.investigation {
                inv.handle_narration(&event);
            }
            match event {
                NarrationEvent::Started { text, .. } | NarrationEvent::Rejected { text, .. } => {
                    events.push(SessionEvent::NarrationShown(text));
                }
                NarrationEvent::Finished { .. } | NarrationEvent::QueueEmpty => {}
            }
        }

        events
    }

    // ---- Views ----

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn fade(&self) -> FadeState {
        self.fade
    }

    /// Screen opacity for the presentation layer (0.0 = black, 1.0 = visible)
    pub fn opacity(&self) -> f32 {
        let fade_ms = self.timings.fade_ms.max(1) as f32;
        match (self.fade, self.transition) {
            (FadeState::Out, Some(trans)) => trans.remaining_ms as f32 / fade_ms,
            (FadeState::Out, None) => 0.0,
            (FadeState::In, _) => 1.0 - self.fade_in_ms as f32 / fade_ms,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn scene_index(&self) -> usize {
        self.scene_index
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_victory(&self) -> bool {
        self.screen == Screen::Game
            && self.transition.is_none()
            && matches!(self.scenes.slot(self.scene_index), SceneSlot::Victory)
    }

    /// The game screen points at a scene that could not be loaded
    pub fn is_missing_scene(&self) -> bool {
        self.screen == Screen::Game
            && self.transition.is_none()
            && matches!(self.scenes.slot(self.scene_index), SceneSlot::Absent)
    }

    pub fn investigation(&self) -> Option<&Investigation> {
        self.investigation.as_ref()
    }

    /// Loading progress while the current scene's assets are fetched
    pub fn loading_progress(&self) -> Option<&PreloadProgress> {
        match &self.investigation {
            Some(inv) if inv.phase() == ScenePhase::Loading => self.loading.as_ref(),
            _ => None,
        }
    }

    pub fn texture(&self, id: &str) -> Option<&Arc<[u8]>> {
        self.textures.get(id)
    }

    pub fn narration(&self) -> &NarrationPlayer {
        &self.narration
    }

    // ---- Internals ----

    fn accepts_input(&self) -> bool {
        self.screen == Screen::Game && self.fade == FadeState::In
    }

    fn begin_fade(&mut self, target: SwapTarget) {
        tracing::debug!("Fade out towards {:?}", target);
        self.fade = FadeState::Out;
        self.transition = Some(ScreenTransition {
            remaining_ms: self.timings.fade_ms,
            target,
        });
    }

    /// Fully faded out: swap what is shown, then fade back in
    fn swap_screen(&mut self, target: SwapTarget) {
        match target {
            SwapTarget::Game => {
                self.screen = Screen::Game;
                self.scene_index = 0;
                self.enter_scene(0);
            }
            SwapTarget::Menu => {
                self.reset();
                self.screen = Screen::Menu;
            }
        }
        tracing::info!("Screen: {:?}", self.screen);
        self.pending.push(SessionEvent::ScreenChanged(self.screen));
        self.fade = FadeState::In;
        self.fade_in_ms = self.timings.fade_ms;
    }

    /// Tear down the previous scene and set up `index`
    fn enter_scene(&mut self, index: usize) {
        self.narration.stop();
        self.narration.clear_clips();
        self.preloader.cancel();
        self.investigation = None;
        self.loading = None;
        self.textures.clear();

        match self.scenes.slot(index) {
            SceneSlot::Scene(scene) => {
                tracing::info!("Entering scene {} '{}'", index, scene.id);
                self.investigation = Some(Investigation::new(scene, &self.timings));
                self.loading = Some(self.preloader.begin(&scene.manifest()));
            }
            SceneSlot::Victory => {
                tracing::info!("All {} scene(s) cleared", self.scenes.len());
                self.pending.push(SessionEvent::Victory);
            }
            SceneSlot::Absent => {
                tracing::warn!("Scene {} is missing", index);
                self.pending.push(SessionEvent::NoScene(index));
            }
        }
    }

    /// Drain preload progress; start the scene once every asset settled
    fn poll_preloader(&mut self, dt_ms: u32, events: &mut Vec<SessionEvent>) {
        let Some(inv) = &mut self.investigation else {
            return;
        };
        if inv.phase() != ScenePhase::Loading {
            return;
        }
        for progress in self.preloader.update(dt_ms) {
            events.push(SessionEvent::LoadingProgress(progress.clone()));
            self.loading = Some(progress);
        }
        if !self.preloader.is_complete() {
            return;
        }
        if let Some(assets) = self.preloader.take_assets() {
            self.narration.set_clips(assets.audio);
            self.textures = assets.textures;
        }
        inv.begin(&mut self.narration);
        events.push(SessionEvent::SceneReady {
            index: self.scene_index,
            title: inv.scene().title.clone(),
        });
        if inv.can_continue() {
            events.push(SessionEvent::ContinueAvailable);
        }
    }

    fn reset(&mut self) {
        self.narration.stop();
        self.narration.clear_clips();
        self.preloader.cancel();
        self.scene_index = 0;
        self.investigation = None;
        self.loading = None;
        self.textures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frostbeat_media::mock::MockChannel;
    use frostbeat_media::{AssetKind, MediaError};

    struct StubLoader;

    impl AssetLoader for StubLoader {
        fn load(&self, kind: AssetKind, id: &str) -> frostbeat_media::Result<Arc<[u8]>> {
            match kind {
                AssetKind::Audio if !id.contains("missing") => Ok(Arc::from(&b"audio"[..])),
                _ => Err(MediaError::NotFound(id.to_string())),
            }
        }
    }

    const TWO_SCENES: &str = r#"[
        {
            "id": "one",
            "title": "One",
            "clues": [
                { "id": "a", "name": "A", "narration": { "text": "a", "audio": "a.mp3", "duration": 1 } }
            ]
        },
        {
            "id": "two",
            "title": "Two",
            "clues": [
                { "id": "b", "name": "B", "narration": { "text": "b", "audio": "missing.mp3", "duration": 1 } }
            ]
        }
    ]"#;

    fn session(json: &str) -> (MockChannel, GameSession) {
        let probe = MockChannel::new();
        let table = SceneTable::from_json_str(json).unwrap();
        let session = GameSession::new(
            table,
            Box::new(probe.clone()),
            Arc::new(StubLoader),
            &Timings::default(),
        );
        (probe, session)
    }

    /// Tick in frame-sized steps, collecting every event
    fn run(session: &mut GameSession, ms: u32) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for _ in 0..ms / 50 {
            events.extend(session.update(50));
        }
        events
    }

    /// Run until the current scene has loaded and started
    fn settle(session: &mut GameSession) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(session.update(50));
            if session
                .investigation()
                .is_some_and(|inv| inv.phase() != ScenePhase::Loading)
                && !session.is_transitioning()
            {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        events
    }

    #[test]
    fn start_fades_then_loads_first_scene() {
        let (probe, mut s) = session(TWO_SCENES);
        assert_eq!(s.screen(), Screen::Menu);
        assert!(s.start_game());
        assert!(probe.is_unlocked());
        assert_eq!(s.fade(), FadeState::Out);
        assert!(!s.start_game());

        // Still on the menu until the fade-out completes
        run(&mut s, 1000);
        assert_eq!(s.screen(), Screen::Menu);
        assert!(s.opacity() < 1.0);

        let events = settle(&mut s);
        assert_eq!(s.screen(), Screen::Game);
        assert_eq!(s.fade(), FadeState::In);
        assert!(events.contains(&SessionEvent::ScreenChanged(Screen::Game)));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SceneReady { index: 0, .. })));
        assert_eq!(s.scene_index(), 0);
    }

    #[test]
    fn progression_reaches_victory_and_counts_failed_assets() {
        let (_probe, mut s) = session(TWO_SCENES);
        s.start_game();
        settle(&mut s);

        assert!(!s.continue_to_next());
        assert!(matches!(s.click_clue("a"), ClickOutcome::Collected { .. }));
        let events = run(&mut s, 100);
        assert!(events.contains(&SessionEvent::ContinueAvailable));

        assert!(s.continue_to_next());
        assert_eq!(s.scene_index(), 1);
        let events = settle(&mut s);
        let last_progress = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::LoadingProgress(p) => Some(p.clone()),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_progress.loaded, 1);
        assert_eq!(last_progress.errors.len(), 1);

        s.click_clue("b");
        assert!(s.continue_to_next());
        assert_eq!(s.scene_index(), 2);
        assert!(s.is_victory());
        assert!(s.investigation().is_none());
        assert!(run(&mut s, 100).contains(&SessionEvent::Victory));
        assert!(!s.continue_to_next());
    }

    #[test]
    fn return_to_menu_resets_scene_state() {
        let (probe, mut s) = session(TWO_SCENES);
        s.start_game();
        settle(&mut s);
        s.click_clue("a");
        assert_eq!(s.investigation().map(|i| i.collected_count()), Some(1));

        assert!(s.return_to_menu());
        assert!(!s.narration().is_playing());
        assert!(probe.plays().iter().all(|p| p.ended_at.is_some()));
        run(&mut s, 1500);
        assert_eq!(s.screen(), Screen::Menu);
        assert_eq!(s.scene_index(), 0);
        assert!(s.investigation().is_none());

        s.start_game();
        settle(&mut s);
        let inv = s.investigation().unwrap();
        assert_eq!(inv.collected_count(), 0);
        assert!(!inv.tutorials().first_click);
        assert!(inv.render_states().iter().all(|c| !c.collected));
    }

    #[test]
    fn scene_index_never_decreases_without_menu() {
        let (_probe, mut s) = session(TWO_SCENES);
        s.start_game();
        settle(&mut s);
        let mut last = s.scene_index();
        for clue in ["a", "b"] {
            s.click_clue(clue);
            s.continue_to_next();
            settle(&mut s);
            assert!(s.scene_index() > last);
            last = s.scene_index();
        }
        assert!(s.is_victory());
    }

    #[test]
    fn play_again_restarts_from_menu() {
        let (_probe, mut s) = session("[]");
        assert!(!s.play_again());
        s.start_game();
        run(&mut s, 1500);
        assert!(s.is_victory());
        assert!(s.play_again());
        assert_eq!(s.screen(), Screen::Menu);
        assert_eq!(s.scene_index(), 0);
        assert!(run(&mut s, 50).contains(&SessionEvent::ScreenChanged(Screen::Menu)));
    }

    #[test]
    fn scene_without_clues_offers_continue_on_arrival() {
        let (_probe, mut s) = session(r#"[{ "id": "only", "clues": [] }]"#);
        s.start_game();
        let events = settle(&mut s);
        assert!(events.contains(&SessionEvent::ContinueAvailable));
        assert!(!s.play_again());

        assert!(s.continue_to_next());
        let events = run(&mut s, 3000);
        assert!(events.contains(&SessionEvent::Victory));
        assert!(s.is_victory());
        assert!(s.play_again());
    }

    #[test]
    fn malformed_scene_shows_no_scene() {
        let (_probe, mut s) = session(r#"[{ "id": "broken" }]"#);
        s.start_game();
        let events = run(&mut s, 1500);
        assert!(events.contains(&SessionEvent::NoScene(0)));
        assert!(s.is_missing_scene());
        assert!(!s.is_victory());
        assert_eq!(s.click_clue("x"), ClickOutcome::Ignored);
        assert!(s.return_to_menu());
    }

    #[test]
    fn input_blocked_while_fading_out() {
        let (_probe, mut s) = session(TWO_SCENES);
        s.start_game();
        settle(&mut s);
        s.click_clue("a");
        s.return_to_menu();
        assert_eq!(s.click_clue("a"), ClickOutcome::Ignored);
        assert!(!s.hover_clue("a"));
        assert!(!s.continue_to_next());
    }
}
