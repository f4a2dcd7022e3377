mod render;

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_config,
    stores::{Param, TranscriptionState, TranscriptionStatus},
    AudioUpload, BackendApi, Session,
};
use shared::{
    catalog::duration_preset,
    domain::{JobId, JobStatus, Theme, TrackId},
    protocol::{SettingsUpdate, TrackSort, TrackUpdate},
};
use tokio::sync::watch;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "studio", about = "Terminal client for the HeartMuLa generation backend")]
struct Cli {
    /// Config file; defaults to ./studio.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend base address, overriding file and environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the push stream and print queue and model changes.
    Watch,
    /// Submit a generation job.
    Generate {
        #[arg(long, conflicts_with = "lyrics_file")]
        lyrics: Option<String>,
        #[arg(long)]
        lyrics_file: Option<PathBuf>,
        /// Style tag; repeat or comma-separate.
        #[arg(long = "tag", value_delimiter = ',', required = true)]
        tags: Vec<String>,
        /// Preset label such as "2 min".
        #[arg(long)]
        duration: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        topk: Option<u32>,
        #[arg(long)]
        cfg_scale: Option<f64>,
        /// Stay attached until the job finishes.
        #[arg(long)]
        wait: bool,
    },
    /// List the job queue.
    Jobs,
    Cancel {
        job_id: String,
    },
    /// List library tracks.
    Tracks {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        favorites: bool,
        #[arg(long, value_enum, default_value_t = SortArg::Newest)]
        sort: SortArg,
        /// Keep paging until every track is loaded.
        #[arg(long)]
        all: bool,
    },
    /// Toggle a track's favorite flag.
    Favorite {
        track_id: String,
    },
    Rename {
        track_id: String,
        title: String,
    },
    DeleteTrack {
        track_id: String,
    },
    /// Upload audio and wait for the extracted lyrics.
    Transcribe {
        file: PathBuf,
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Print the playable address of a track.
    PlayUrl {
        track_id: String,
    },
    /// Model, GPU and connectivity.
    Status,
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Style tag catalog and duration presets.
    Tags,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        topk: Option<u32>,
        #[arg(long)]
        cfg_scale: Option<f64>,
        #[arg(long)]
        max_length_ms: Option<u32>,
        #[arg(long, value_enum)]
        theme: Option<ThemeArg>,
        #[arg(long)]
        auto_save: Option<bool>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Newest,
    Title,
    Duration,
}

impl From<SortArg> for TrackSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Newest => TrackSort::CreatedAt,
            SortArg::Title => TrackSort::Title,
            SortArg::Duration => TrackSort::DurationMs,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ThemeArg {
    Dark,
    Light,
}

impl From<ThemeArg> for Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Light => Theme::Light,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(api_url) = cli.api_url {
        config.api_url = Some(api_url);
    }
    let session = Session::new(config).context("building session")?;
    debug!(base = %session.base().as_str(), "using backend");

    let outcome = run(&session, cli.command).await;
    session.shutdown().await;
    outcome
}

async fn run(session: &Session, command: Command) -> Result<()> {
    let stores = session.stores();
    match command {
        Command::Watch => watch_stream(session).await?,
        Command::Generate {
            lyrics,
            lyrics_file,
            tags,
            duration,
            temperature,
            topk,
            cfg_scale,
            wait,
        } => {
            let lyrics = match (lyrics, lyrics_file) {
                (Some(lyrics), _) => lyrics,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("pass --lyrics or --lyrics-file"),
            };

            session.start();
            session.hydrate().await;

            let studio = &stores.studio;
            studio.set_lyrics(lyrics);
            studio.set_tags(tags);
            if let Some(label) = duration {
                let Some(ms) = duration_preset(&label) else {
                    bail!("unknown duration {label:?}; run `studio tags` for presets");
                };
                studio.set_param(Param::MaxLengthMs, f64::from(ms));
            }
            if let Some(value) = temperature {
                studio.set_param(Param::Temperature, value);
            }
            if let Some(value) = topk {
                studio.set_param(Param::Topk, f64::from(value));
            }
            if let Some(value) = cfg_scale {
                studio.set_param(Param::CfgScale, value);
            }
            studio.validation()?;

            let Some(job_id) = studio.submit().await else {
                bail!("backend did not accept the generation request");
            };
            println!("submitted job_id={job_id}");
            if wait {
                await_job(session, &job_id).await?;
            }
        }
        Command::Jobs => {
            stores.queue.fetch_jobs().await?;
            print!("{}", render::queue(&stores.queue.snapshot()));
        }
        Command::Cancel { job_id } => {
            let job_id = JobId::from(job_id);
            if stores.queue.cancel_job(&job_id).await? {
                println!("cancelled job_id={job_id}");
            } else {
                bail!("job {job_id} could not be cancelled");
            }
        }
        Command::Tracks {
            search,
            tags,
            favorites,
            sort,
            all,
        } => {
            let library = &stores.library;
            let mut fetched = false;
            if tags.is_some() {
                library.set_tag_filter(tags).await?;
                fetched = true;
            }
            if favorites {
                library.set_favorites_only(true).await?;
                fetched = true;
            }
            let sort = TrackSort::from(sort);
            if sort != library.snapshot().sort {
                library.set_sort(sort).await?;
                fetched = true;
            }
            if let Some(search) = search {
                library.set_search(search).await?;
                fetched = true;
            }
            if !fetched {
                library.fetch_tracks().await?;
            }
            while all && library.snapshot().has_more() {
                library.load_more().await?;
            }
            print!("{}", render::library(&library.snapshot()));
        }
        Command::Favorite { track_id } => {
            let track_id = TrackId::from(track_id);
            locate_track(session, &track_id).await?;
            stores.library.toggle_favorite(&track_id).await?;
            let favorite = stores
                .library
                .snapshot()
                .tracks
                .iter()
                .find(|track| track.id == track_id)
                .is_some_and(|track| track.favorite);
            println!("track {track_id} favorite={favorite}");
        }
        Command::Rename { track_id, title } => {
            let track = stores
                .library
                .update_track(
                    &TrackId::from(track_id),
                    TrackUpdate {
                        title: Some(title),
                        ..TrackUpdate::default()
                    },
                )
                .await?;
            println!("renamed {} to {:?}", track.id, track.title);
        }
        Command::DeleteTrack { track_id } => {
            let track_id = TrackId::from(track_id);
            stores.library.delete_track(&track_id).await?;
            println!("deleted track {track_id}");
        }
        Command::Transcribe { file, timeout_secs } => {
            let upload = AudioUpload::from_path(&file).await?;
            session.start();
            transcribe(session, upload, Duration::from_secs(timeout_secs)).await?;
        }
        Command::PlayUrl { track_id } => {
            let track = session.api().get_track(&TrackId::from(track_id)).await?;
            stores.player.play(track);
            print!(
                "{}",
                render::player(&stores.player.snapshot(), session.base())
            );
        }
        Command::Status => {
            let refreshed = stores.system.refresh().await;
            print!("{}", render::system(&stores.system.snapshot()));
            refreshed?;
        }
        Command::Settings(SettingsCommand::Show) => {
            let settings = stores.settings.fetch_settings().await?;
            print!("{}", render::settings(&settings));
        }
        Command::Settings(SettingsCommand::Set {
            temperature,
            topk,
            cfg_scale,
            max_length_ms,
            theme,
            auto_save,
        }) => {
            let update = SettingsUpdate {
                default_temperature: temperature,
                default_topk: topk,
                default_cfg_scale: cfg_scale,
                default_max_length_ms: max_length_ms,
                theme: theme.map(Theme::from),
                auto_save_tracks: auto_save,
            };
            if update.is_empty() {
                bail!("nothing to change");
            }
            let settings = stores.settings.update_settings(&update).await?;
            print!("{}", render::settings(&settings));
        }
        Command::Tags => print!("{}", render::catalog()),
    }
    Ok(())
}

/// Pages through the library until `track_id` is loaded.
async fn locate_track(session: &Session, track_id: &TrackId) -> Result<()> {
    let library = &session.stores().library;
    library.fetch_tracks().await?;
    loop {
        let state = library.snapshot();
        if state.tracks.iter().any(|track| &track.id == track_id) {
            return Ok(());
        }
        if !state.has_more() {
            bail!("track {track_id} not found");
        }
        library.load_more().await?;
    }
}

async fn watch_stream(session: &Session) -> Result<()> {
    let stores = session.stores();
    let mut queue = stores.queue.subscribe();
    let mut system = stores.system.subscribe();
    session.start();
    session.hydrate().await;

    print!("{}", render::system(&system.borrow_and_update()));
    print!("{}", render::queue(&queue.borrow_and_update()));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = system.changed() => {
                changed?;
                println!("--");
                print!("{}", render::system(&system.borrow_and_update()));
            }
            changed = queue.changed() => {
                changed?;
                println!("--");
                print!("{}", render::queue(&queue.borrow_and_update()));
            }
        }
    }
    Ok(())
}

async fn await_job(session: &Session, job_id: &JobId) -> Result<()> {
    let store = &session.stores().queue;
    let mut queue = store.subscribe();
    // The queued event may have gone out before the stream was up.
    if store.job(job_id).is_none() {
        match session.api().get_job(job_id).await {
            Ok(job) => store.add_job(job),
            Err(err) => warn!(job_id = %job_id, error = %err, "could not load submitted job"),
        }
    }
    let mut last_progress = None;
    loop {
        let job = queue.borrow_and_update().job(job_id).cloned();
        if let Some(job) = job {
            match job.status {
                JobStatus::Completed => {
                    let url = job.output_url.as_deref().unwrap_or_default();
                    println!("completed {}", session.base().join(url));
                    return Ok(());
                }
                JobStatus::Failed => {
                    bail!("job failed: {}", job.error.unwrap_or_default())
                }
                JobStatus::Cancelled => bail!("job was cancelled"),
                JobStatus::Processing => {
                    let percent = (job.progress.unwrap_or(0.0) * 100.0).round() as u32;
                    if last_progress != Some(percent) {
                        println!("processing {percent}%");
                        last_progress = Some(percent);
                    }
                }
                JobStatus::Pending => {}
            }
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => bail!("interrupted; job {job_id} keeps running"),
            changed = queue.changed() => changed?,
        }
    }
}

async fn transcribe(session: &Session, upload: AudioUpload, timeout: Duration) -> Result<()> {
    let store = &session.stores().transcription;
    let mut state = store.subscribe();
    let job_id = store.upload(upload).await?;
    println!("transcription job_id={job_id}");

    let settled = tokio::time::timeout(timeout, settled(&mut state))
        .await
        .context("timed out waiting for transcription")??;
    match settled {
        TranscriptionStatus::Completed { lyrics, .. } => {
            println!("{lyrics}");
            Ok(())
        }
        TranscriptionStatus::Failed { error, .. } => bail!("transcription failed: {error}"),
        other => bail!("unexpected transcription state {other:?}"),
    }
}

async fn settled(
    state: &mut watch::Receiver<TranscriptionState>,
) -> Result<TranscriptionStatus> {
    loop {
        let status = state.borrow_and_update().status.clone();
        if matches!(
            status,
            TranscriptionStatus::Completed { .. } | TranscriptionStatus::Failed { .. }
        ) {
            return Ok(status);
        }
        state.changed().await?;
    }
}
