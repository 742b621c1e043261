// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flacfetch::batch::{self, CheckFileExistenceRequest};
use flacfetch::config::Settings;
use flacfetch::history::HistoryStore;
use flacfetch::lyrics::{render_lrc, LrclibClient};
use flacfetch::naming::{self, FilenameSpec, DEFAULT_FILENAME_FORMAT};
use flacfetch::provider::{IsrcResolver, LinkResolver, LyricsSource};
use flacfetch::resolve::{DeezerClient, SongLinkClient};

#[derive(Parser, Debug)]
#[command(name = "flacfetch", version, about = "Track lookup, naming and download bookkeeping")]
struct CliArgs {
    /// Path to a TOML config file. Defaults to <config dir>/flacfetch/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the filename a track would be stored under.
    Filename {
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
        #[arg(long, default_value = "")]
        album: String,
        #[arg(long, default_value = "")]
        album_artist: String,
        #[arg(long, default_value = "")]
        release_date: String,
        #[arg(long, default_value = DEFAULT_FILENAME_FORMAT)]
        format: String,
        #[arg(long)]
        track_number: bool,
        #[arg(long, default_value_t = 0)]
        position: u32,
        #[arg(long, default_value_t = 0)]
        album_track: u32,
        #[arg(long, default_value_t = 0)]
        disc: u32,
        #[arg(long)]
        use_album_track_number: bool,
    },
    /// Check which tracks of a JSON list already exist on disk.
    Check {
        /// Output directory; defaults to the configured one.
        #[arg(long)]
        dir: Option<String>,
        /// JSON array of tracks, or `-` for stdin.
        tracks: PathBuf,
    },
    /// Derive a track's ISRC from its Spotify ID.
    ResolveIsrc { spotify_id: String },
    /// Fetch lyrics and print them as LRC.
    Lyrics {
        track: String,
        artist: String,
    },
    /// Inspect or clear the download history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    Clear,
}

fn read_tracks(path: &Path) -> Result<Vec<CheckFileExistenceRequest>> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("Failed to read tracks from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read tracks file: {:?}", path))?
    };
    serde_json::from_str(&content).context("Tracks must be a JSON array of track objects")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let settings = Settings::load(cli_args.config.as_deref())?;

    match cli_args.command {
        Command::Filename {
            title,
            artist,
            album,
            album_artist,
            release_date,
            format,
            track_number,
            position,
            album_track,
            disc,
            use_album_track_number,
        } => {
            let filename = naming::expected_filename(&FilenameSpec {
                track_name: &title,
                artist_name: &artist,
                album_name: &album,
                album_artist: &album_artist,
                release_date: &release_date,
                format: &format,
                include_track_number: track_number,
                position,
                album_track_number: album_track,
                disc_number: disc,
                use_album_track_number,
            });
            println!("{filename}");
        }
        Command::Check { dir, tracks } => {
            let tracks = read_tracks(&tracks)?;
            let dir = dir.unwrap_or_else(|| settings.output_dir.to_string_lossy().into_owned());
            let results = batch::check_existence(&dir, &tracks, settings.batch_concurrency).await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::ResolveIsrc { spotify_id } => {
            let links = SongLinkClient::new(settings.http_timeout())?;
            let deezer = DeezerClient::new(settings.http_timeout())?;
            let url = links
                .resolve_cross_service_url(&spotify_id)
                .await
                .context("Failed to resolve cross-service URL")?;
            info!(url = %url, "resolved cross-service URL");
            let isrc = deezer
                .resolve_isrc_from_url(&url)
                .await
                .context("Failed to resolve ISRC")?;
            println!("{isrc}");
        }
        Command::Lyrics { track, artist } => {
            let client = LrclibClient::new(settings.http_timeout())?;
            let Some((lyrics, source)) = client.fetch_lyrics("", &track, &artist).await? else {
                bail!("No lyrics found for {track} by {artist}");
            };
            info!(source = %source, lines = lyrics.lines.len(), "lyrics found");
            print!("{}", render_lrc(&lyrics, &track, &artist));
        }
        Command::History { action } => {
            let store = HistoryStore::open(&settings.history_db).await?;
            match action {
                HistoryAction::List => {
                    let items = store.list(&settings.history_namespace).await?;
                    println!("{}", serde_json::to_string_pretty(&items)?);
                }
                HistoryAction::Clear => {
                    let removed = store.clear(&settings.history_namespace).await?;
                    info!(removed, "history cleared");
                }
            }
        }
    }

    Ok(())
}
