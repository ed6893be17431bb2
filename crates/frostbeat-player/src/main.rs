/// Frostbeat Mysteries: narrated clue-hunting adventure
///
/// Architecture:
///   assets/   Filesystem asset loader (audio + textures)
///   engine/   Console game loop, rodio narration channel
///   game/     Scene table, investigation state machine, session progression

mod assets;
mod engine;
mod game;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use frostbeat_common::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "frostbeat", version, about = "Frostbeat Mysteries: a narrated clue hunt")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory that audio and texture references resolve against
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Scene table (JSON) replacing the built-in one
    #[arg(long)]
    scenes: Option<PathBuf>,

    /// Run without audio output; narration keeps its timing
    #[arg(long)]
    mute: bool,

    /// Debug logging for frostbeat crates
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(assets) = args.assets {
        config.assets_dir = assets;
    }
    if let Some(scenes) = args.scenes {
        config.scenes_file = Some(scenes);
    }
    if args.mute {
        config.audio.enabled = false;
    }

    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if args.verbose {
        filter = filter.add_directive("frostbeat=debug".parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Frostbeat Mysteries v{}", env!("CARGO_PKG_VERSION"));

    let scenes = match &config.scenes_file {
        Some(path) => game::scenes::SceneTable::load(path)
            .with_context(|| format!("Failed to load scenes from {}", path.display()))?,
        None => game::scenes::SceneTable::builtin(),
    };

    let channel = engine::sound_engine::open_channel(&config.audio);
    let loader = Arc::new(assets::FsAssetLoader::new(&config.assets_dir));
    let session = game::GameSession::new(scenes, channel, loader, &config.timings);

    engine::run(session)
}
