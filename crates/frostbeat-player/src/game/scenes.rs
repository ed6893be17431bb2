//! Scene table: authored scene content and per-index lookup
//!
//! Scenes are authored as a JSON array. Each entry is parsed on its own so
//! that one malformed scene leaves an absent slot instead of rejecting the
//! whole table.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use frostbeat_common::secs_to_ms;
use frostbeat_media::{AssetManifest, NarrationRequest};

const BUILTIN_SCENES: &str = include_str!("../../data/scenes.json");

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to read scene table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scene table is not a JSON array: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Scene {index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, SceneError>;

/// A voiced line: subtitle text, audio reference, declared length in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    pub text: String,
    #[serde(default)]
    pub audio: String,
    #[serde(default)]
    pub duration: Option<f32>,
}

impl Narration {
    pub fn duration_ms(&self) -> Option<u32> {
        self.duration.map(secs_to_ms)
    }

    /// Declared length, or `default_ms` when the author left it out
    pub fn duration_or(&self, default_ms: u32) -> u32 {
        self.duration_ms().unwrap_or(default_ms)
    }

    pub fn request(&self, default_ms: u32) -> NarrationRequest {
        NarrationRequest::new(self.audio.clone(), self.text.clone())
            .with_duration_ms(self.duration_or(default_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneNarration {
    #[serde(default)]
    pub intro: Option<Narration>,
    #[serde(default)]
    pub scene: Option<Narration>,
}

/// A clickable object in the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clue {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Placement in the 3D scene (presentation only)
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default)]
    pub narration: Option<Narration>,
    #[serde(default)]
    pub collected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutorialTrigger {
    /// First click on any clue in the scene
    FirstClick,
    /// First clue collected
    FirstClue,
    /// Last required clue collected
    AllClues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tutorial {
    pub trigger: TutorialTrigger,
    pub text: String,
    #[serde(default)]
    pub audio: String,
    #[serde(default)]
    pub duration: Option<f32>,
}

impl Tutorial {
    pub fn narration(&self) -> Narration {
        Narration {
            text: self.text.clone(),
            audio: self.audio.clone(),
            duration: self.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Fallback text when the scene has no narration
    #[serde(default)]
    pub story: String,
    #[serde(default)]
    pub narration: SceneNarration,
    pub clues: Vec<Clue>,
    /// Flavour objects: narrated once, never counted
    #[serde(default, alias = "optionalClues")]
    pub optional_clues: Vec<Clue>,
    #[serde(default)]
    pub tutorials: Vec<Tutorial>,
    #[serde(default, alias = "exitNarration")]
    pub exit_narration: Option<Narration>,
    #[serde(default)]
    pub textures: Vec<String>,
}

impl Scene {
    pub fn tutorial(&self, trigger: TutorialTrigger) -> Option<&Tutorial> {
        self.tutorials.iter().find(|t| t.trigger == trigger)
    }

    pub fn clue(&self, id: &str) -> Option<&Clue> {
        self.clues.iter().find(|c| c.id == id)
    }

    pub fn optional_clue(&self, id: &str) -> Option<&Clue> {
        self.optional_clues.iter().find(|c| c.id == id)
    }

    /// Every audio and texture reference the scene needs, deduplicated
    pub fn manifest(&self) -> AssetManifest {
        let mut manifest = AssetManifest::new();
        let narrations = [&self.narration.intro, &self.narration.scene]
            .into_iter()
            .flatten()
            .chain(
                self.clues
                    .iter()
                    .chain(&self.optional_clues)
                    .filter_map(|c| c.narration.as_ref()),
            )
            .chain(&self.exit_narration);
        for narration in narrations {
            manifest.push_audio(&narration.audio);
        }
        for tutorial in &self.tutorials {
            manifest.push_audio(&tutorial.audio);
        }
        for texture in &self.textures {
            manifest.push_texture(texture);
        }
        manifest
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("empty scene id".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for clue in self.clues.iter().chain(&self.optional_clues) {
            if clue.id.is_empty() {
                return Err("clue with empty id".to_string());
            }
            if !seen.insert(clue.id.as_str()) {
                return Err(format!("duplicate clue id '{}'", clue.id));
            }
        }
        Ok(())
    }
}

/// What lives at a scene index
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneSlot<'a> {
    Scene(&'a Scene),
    /// One past the last scene: the victory screen
    Victory,
    /// Missing or malformed entry
    Absent,
}

/// Ordered list of scenes. Slots that failed to parse stay `None`.
#[derive(Debug, Clone, Default)]
pub struct SceneTable {
    slots: Vec<Option<Scene>>,
}

impl SceneTable {
    /// Scenes shipped with the game
    pub fn builtin() -> Self {
        match Self::from_json_str(BUILTIN_SCENES) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!("Built-in scene table unreadable: {}", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_json_str(&text)?;
        tracing::info!("Loaded {} scene(s) from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(text)?;
        let slots = entries
            .into_iter()
            .enumerate()
            .map(|(index, value)| match Self::parse_entry(index, value) {
                Ok(scene) => Some(scene),
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            })
            .collect();
        Ok(Self { slots })
    }

    fn parse_entry(index: usize, value: serde_json::Value) -> Result<Scene> {
        let scene: Scene = serde_json::from_value(value).map_err(|e| SceneError::Invalid {
            index,
            reason: e.to_string(),
        })?;
        scene
            .validate()
            .map_err(|reason| SceneError::Invalid { index, reason })?;
        Ok(scene)
    }

    /// Number of slots, including absent ones
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> SceneSlot<'_> {
        match self.slots.get(index) {
            Some(Some(scene)) => SceneSlot::Scene(scene),
            Some(None) => SceneSlot::Absent,
            None if index == self.slots.len() => SceneSlot::Victory,
            None => SceneSlot::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_frozen_outpost() {
        let table = SceneTable::builtin();
        assert_eq!(table.len(), 1);
        let SceneSlot::Scene(scene) = table.slot(0) else {
            panic!("level 1 missing");
        };
        assert_eq!(scene.id, "level1_intro");
        assert_eq!(scene.title, "Level 1 - Frozen Outpost");
        let ids: Vec<_> = scene.clues.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["footprints", "fabric", "headphone"]);
        assert!(scene.clues.iter().all(|c| !c.collected));
        assert_eq!(scene.optional_clues.len(), 1);
        assert_eq!(scene.tutorials.len(), 3);
        assert_eq!(
            scene.narration.intro.as_ref().and_then(|n| n.duration_ms()),
            Some(38_000)
        );
        assert_eq!(table.slot(1), SceneSlot::Victory);
        assert_eq!(table.slot(2), SceneSlot::Absent);
    }

    #[test]
    fn manifest_covers_all_narrations_once() {
        let table = SceneTable::builtin();
        let SceneSlot::Scene(scene) = table.slot(0) else {
            panic!("level 1 missing");
        };
        let manifest = scene.manifest();
        // intro, scene, 3 clues, campfire, 3 tutorials, exit
        assert_eq!(manifest.audio.len(), 10);
        assert!(manifest.textures.is_empty());
        assert!(manifest
            .audio
            .iter()
            .any(|a| a == "sounds/Level1/FollowTrail.mp3"));
    }

    #[test]
    fn shared_audio_is_deduplicated() {
        let json = r#"[{
            "id": "s",
            "narration": { "intro": { "text": "a", "audio": "x.mp3" } },
            "clues": [
                { "id": "c", "name": "C", "narration": { "text": "b", "audio": "x.mp3" } }
            ],
            "textures": ["snow.png", "snow.png"]
        }]"#;
        let table = SceneTable::from_json_str(json).unwrap();
        let SceneSlot::Scene(scene) = table.slot(0) else {
            panic!("scene missing");
        };
        let manifest: AssetManifest = scene.manifest();
        assert_eq!(manifest.audio, vec!["x.mp3".to_string()]);
        assert_eq!(manifest.textures, vec!["snow.png".to_string()]);
    }

    #[test]
    fn malformed_entry_becomes_absent_slot() {
        let json = r#"[
            { "id": "one", "clues": [] },
            { "id": "two" },
            { "id": "three", "clues": [
                { "id": "a", "name": "A" }, { "id": "a", "name": "A again" }
            ] },
            { "id": "four", "clues": [], "exitNarration": { "text": "bye" } }
        ]"#;
        let table = SceneTable::from_json_str(json).unwrap();
        assert_eq!(table.len(), 4);
        assert!(matches!(table.slot(0), SceneSlot::Scene(s) if s.id == "one"));
        assert_eq!(table.slot(1), SceneSlot::Absent);
        assert_eq!(table.slot(2), SceneSlot::Absent);
        let SceneSlot::Scene(four) = table.slot(3) else {
            panic!("scene four missing");
        };
        assert_eq!(four.exit_narration.as_ref().map(|n| n.text.as_str()), Some("bye"));
        assert_eq!(table.slot(4), SceneSlot::Victory);
    }

    #[test]
    fn top_level_must_be_an_array() {
        assert!(matches!(
            SceneTable::from_json_str(r#"{ "id": "x" }"#),
            Err(SceneError::Parse(_))
        ));
    }

    #[test]
    fn empty_table_is_immediate_victory() {
        let table = SceneTable::from_json_str("[]").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.slot(0), SceneSlot::Victory);
    }

    #[test]
    fn missing_duration_uses_default() {
        let n = Narration {
            text: "t".into(),
            audio: "a.mp3".into(),
            duration: None,
        };
        assert_eq!(n.duration_or(3000), 3000);
        assert_eq!(n.request(3000).duration_ms, Some(3000));
        let timed = Narration {
            duration: Some(4.5),
            ..n
        };
        assert_eq!(timed.request(3000).duration_ms, Some(4500));
    }

    #[test]
    fn tutorial_lookup_by_trigger() {
        let table = SceneTable::builtin();
        let SceneSlot::Scene(scene) = table.slot(0) else {
            panic!("level 1 missing");
        };
        let t = scene.tutorial(TutorialTrigger::AllClues).unwrap();
        assert_eq!(t.duration, Some(6.0));
        assert_eq!(t.narration().audio, "sounds/Level1/Level1AllClues.mp3");
    }
}
