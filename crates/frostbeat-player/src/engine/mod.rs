//! Console front-end: text commands in, game view out
//!
//! A reader thread forwards stdin lines over a channel; the main loop runs
//! at a fixed frame rate, applies queued commands, ticks the session and
//! prints what changed. Logs go to stderr, the game view to stdout.

pub mod sound_engine;

use std::collections::VecDeque;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::game::investigation::{ClickOutcome, ScenePhase};
use crate::game::{GameSession, Screen, SessionEvent};

const FPS: u64 = 30;
const FRAME_MS: u32 = (1000 / FPS) as u32;

/// One line of player input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Click(String),
    Hover(String),
    Unhover,
    Dismiss,
    Continue,
    Menu,
    Again,
    Status,
    /// Hold the following commands back (scripted input)
    Wait(u32),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or("").to_ascii_lowercase();
        let arg = words.next();
        let clue = |arg: Option<&str>| {
            arg.map(str::to_string)
                .ok_or_else(|| format!("'{}' needs a clue id", verb))
        };
        match verb.as_str() {
            "start" => Ok(Command::Start),
            "click" | "c" => clue(arg).map(Command::Click),
            "hover" | "h" => clue(arg).map(Command::Hover),
            "unhover" => Ok(Command::Unhover),
            "dismiss" | "x" => Ok(Command::Dismiss),
            "continue" | "next" => Ok(Command::Continue),
            "menu" => Ok(Command::Menu),
            "again" => Ok(Command::Again),
            "status" | "s" => Ok(Command::Status),
            "wait" => arg
                .and_then(|ms| ms.parse().ok())
                .map(Command::Wait)
                .ok_or_else(|| "'wait' needs a duration in ms".to_string()),
            "help" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command '{}' (try 'help')", other)),
        }
    }
}

const HELP: &str = "\
Commands:
  start            start the game (menu)
  click <clue>     investigate a clue
  hover <clue>     highlight a clue
  unhover          clear the highlight
  dismiss          hide the narration box
  continue         next scene (once every clue is found)
  menu             return to the menu
  again            play again (victory screen)
  status           show the current scene
  wait <ms>        pause scripted input
  quit";

/// Run the console game loop until `quit` or end of input
pub fn run(mut session: GameSession) -> Result<()> {
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    tracing::info!("Engine initialized, entering game loop");
    println!("{}", HELP);
    println!("{}", render_status(&session));

    let frame = Duration::from_millis(1000 / FPS);
    let mut backlog: VecDeque<String> = VecDeque::new();
    let mut input_closed = false;
    let mut hold_ms: u32 = 0;

    'frames: loop {
        let frame_start = Instant::now();

        loop {
            match rx.try_recv() {
                Ok(line) => backlog.push_back(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    input_closed = true;
                    break;
                }
            }
        }

        hold_ms = hold_ms.saturating_sub(FRAME_MS);
        while hold_ms == 0 {
            let Some(line) = backlog.pop_front() else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Quit) => break 'frames,
                Ok(Command::Wait(ms)) => hold_ms = ms,
                Ok(command) => println!("{}", apply(&mut session, command)),
                Err(e) => println!("{}", e),
            }
        }
        if input_closed && backlog.is_empty() && hold_ms == 0 {
            break;
        }

        for event in session.update(FRAME_MS) {
            println!("{}", describe(&event));
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame {
            std::thread::sleep(frame - elapsed);
        }
    }

    tracing::info!("Engine shutdown");
    Ok(())
}

/// Apply a command and describe its immediate result
pub fn apply(session: &mut GameSession, command: Command) -> String {
    match command {
        Command::Start => {
            if session.start_game() {
                "Starting...".to_string()
            } else {
                "The game can only be started from the menu.".to_string()
            }
        }
        Command::Click(id) => match session.click_clue(&id) {
            ClickOutcome::Tutorial => format!("You look closely at '{}'...", id),
            ClickOutcome::Collected { .. } => format!("Picked up '{}'.", id),
            ClickOutcome::AlreadyCollected => format!("'{}' has nothing more to tell.", id),
            ClickOutcome::OptionalHeard => format!("You take a moment at '{}'.", id),
            ClickOutcome::UnknownClue => format!("There is no '{}' here.", id),
            ClickOutcome::Ignored => "Nothing to click right now.".to_string(),
        },
        Command::Hover(id) => {
            if session.hover_clue(&id) {
                format!("> {}", id)
            } else {
                format!("'{}' cannot be highlighted.", id)
            }
        }
        Command::Unhover => {
            session.unhover_clue();
            "(highlight cleared)".to_string()
        }
        Command::Dismiss => {
            session.dismiss_narration();
            "(narration hidden)".to_string()
        }
        Command::Continue => {
            if session.continue_to_next() {
                "Following the trail...".to_string()
            } else {
                "Find every clue before moving on.".to_string()
            }
        }
        Command::Menu => {
            if session.return_to_menu() {
                "Returning to the menu...".to_string()
            } else {
                "Already at the menu.".to_string()
            }
        }
        Command::Again => {
            if session.play_again() {
                "Starting over.".to_string()
            } else {
                "Play again is offered after the last scene.".to_string()
            }
        }
        Command::Status => render_status(session),
        Command::Help => HELP.to_string(),
        Command::Wait(_) | Command::Quit => String::new(),
    }
}

/// One line per session event
pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::ScreenChanged(Screen::Menu) => "== FROSTBEAT MYSTERIES ==  (type 'start')".to_string(),
        SessionEvent::ScreenChanged(Screen::Game) => "== Entering the game ==".to_string(),
        SessionEvent::LoadingProgress(p) => {
            let mut line = format!("Loading... {:.0}% ({}/{})", p.percent(), p.loaded, p.total);
            if !p.errors.is_empty() {
                line.push_str(&format!(" [{} failed]", p.errors.len()));
            }
            line
        }
        SessionEvent::SceneReady { index, title } => format!("-- Scene {}: {} --", index + 1, title),
        SessionEvent::NarrationShown(text) => format!("\u{1F399}  {}", text),
        SessionEvent::ClueCollected { id, count, total } => {
            format!("Clue found: {} ({}/{})", id, count, total)
        }
        SessionEvent::ContinueAvailable => "All clues found! Type 'continue'.".to_string(),
        SessionEvent::Victory => {
            "*** Victory! The trail leads into a glowing crystal cave. ('again' or 'menu') ***"
                .to_string()
        }
        SessionEvent::NoScene(index) => format!("Scene {} could not be loaded. ('menu')", index + 1),
    }
}

/// Full view of the current screen
pub fn render_status(session: &GameSession) -> String {
    if session.screen() == Screen::Menu {
        return "[Menu] Frostbeat Mysteries. Type 'start' to begin.".to_string();
    }
    if session.is_transitioning() {
        return format!("[Fading] {:.0}%", session.opacity() * 100.0);
    }
    if session.is_victory() {
        return "[Victory] Every scene cleared. 'again' or 'menu'.".to_string();
    }
    if session.is_missing_scene() {
        return "[No scene] 'menu' to go back.".to_string();
    }
    let Some(inv) = session.investigation() else {
        return "[Empty]".to_string();
    };
    if let Some(progress) = session.loading_progress() {
        return format!(
            "[Loading] {:.0}% ({}/{}, {} failed)",
            progress.percent(),
            progress.loaded,
            progress.total,
            progress.errors.len()
        );
    }

    let scene = inv.scene();
    let mut out = format!(
        "[Scene {}/{}] {} ({:?})\n",
        session.scene_index() + 1,
        session.scene_count(),
        scene.title,
        inv.phase()
    );
    for state in inv.render_states() {
        let clue = scene
            .clue(&state.id)
            .or_else(|| scene.optional_clue(&state.id));
        let (icon, name) = clue.map_or(("?", state.id.as_str()), |c| (c.icon.as_str(), c.name.as_str()));
        let mark = if state.collected { "x" } else { " " };
        let cursor = if state.hovered { ">" } else { " " };
        out.push_str(&format!("{} [{}] {} {} ({})\n", cursor, mark, icon, name, state.id));
    }

    let found: Vec<String> = inv
        .collected_clues()
        .iter()
        .map(|c| format!("{} {}", c.icon, c.name))
        .collect();
    out.push_str(&format!(
        "Clues {}/{}: {}",
        inv.collected_count(),
        inv.total_clues(),
        if found.is_empty() { "-".to_string() } else { found.join(", ") }
    ));
    if inv.all_found() && inv.phase() == ScenePhase::AllCollected {
        out.push_str("  (all found, 'continue')");
    }
    if !scene.textures.is_empty() {
        let ready = scene
            .textures
            .iter()
            .filter(|t| session.texture(t).is_some())
            .count();
        out.push_str(&format!("\nTextures {}/{}", ready, scene.textures.len()));
    }
    if inv.is_narration_visible() {
        out.push_str(&format!("\n\"{}\"", inv.narration_text()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::scenes::SceneTable;
    use frostbeat_common::Timings;
    use frostbeat_media::{AssetKind, AssetLoader, SilentChannel};
    use std::sync::Arc;

    struct EmptyLoader;

    impl AssetLoader for EmptyLoader {
        fn load(&self, _kind: AssetKind, id: &str) -> frostbeat_media::Result<Arc<[u8]>> {
            Err(frostbeat_media::MediaError::NotFound(id.to_string()))
        }
    }

    fn session() -> GameSession {
        GameSession::new(
            SceneTable::builtin(),
            Box::new(SilentChannel::new()),
            Arc::new(EmptyLoader),
            &Timings::default(),
        )
    }

    #[test]
    fn parses_commands() {
        assert_eq!("start".parse(), Ok(Command::Start));
        assert_eq!("  click footprints ".parse(), Ok(Command::Click("footprints".into())));
        assert_eq!("H fabric".parse(), Ok(Command::Hover("fabric".into())));
        assert_eq!("wait 1500".parse(), Ok(Command::Wait(1500)));
        assert_eq!("q".parse(), Ok(Command::Quit));
        assert!("click".parse::<Command>().is_err());
        assert!("wait soon".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[test]
    fn console_walkthrough_of_level_one() {
        let mut s = session();
        assert!(render_status(&s).starts_with("[Menu]"));
        assert_eq!(apply(&mut s, Command::Start), "Starting...");

        for _ in 0..400 {
            s.update(FRAME_MS);
            if s.investigation().is_some_and(|i| i.phase() != ScenePhase::Loading) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        let status = render_status(&s);
        assert!(status.contains("Frozen Outpost"), "{}", status);
        assert!(status.contains("Clues 0/3: -"));

        assert!(apply(&mut s, Command::Click("footprints".into())).contains("look closely"));
        assert!(apply(&mut s, Command::Click("footprints".into())).starts_with("Picked up"));
        apply(&mut s, Command::Hover("fabric".into()));
        let status = render_status(&s);
        assert!(status.contains("> [ ] 🧵 Purple Fabric Scrap (fabric)"), "{}", status);
        assert!(status.contains("[x] 👣 Strange Footprints"));
        assert!(status.contains("Clues 1/3: 👣 Strange Footprints"));

        assert!(apply(&mut s, Command::Continue).starts_with("Find every clue"));
        apply(&mut s, Command::Click("fabric".into()));
        apply(&mut s, Command::Click("headphone".into()));
        assert!(render_status(&s).contains("all found"));
        assert_eq!(apply(&mut s, Command::Continue), "Following the trail...");
        assert!(render_status(&s).starts_with("[Victory]"));
    }

    #[test]
    fn describes_loading_failures() {
        let line = describe(&SessionEvent::LoadingProgress(frostbeat_media::PreloadProgress {
            loaded: 1,
            total: 2,
            errors: vec![frostbeat_media::LoadFailure {
                kind: AssetKind::Audio,
                id: "a.mp3".into(),
                reason: "missing".into(),
            }],
        }));
        assert_eq!(line, "Loading... 50% (1/2) [1 failed]");
    }
}
