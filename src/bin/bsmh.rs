#![forbid(unsafe_code)]

//! Maps handler. Builds a `.bplist` playlist out of the newest BeatSaver
//! uploads and optionally installs its maps, or removes the maps listed in an
//! existing playlist.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use bsmh::BsmhError;
use bsmh::archive::ArchivePipeline;
use bsmh::catalog::BeatSaverClient;
use bsmh::config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings};
use bsmh::playlist::{self, BuildOptions, PlaylistDocument};
use bsmh::prune::prune;
use bsmh::window::{self, WindowRequest};
use chrono::Utc;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "bsmh", version, about = "Maps handler for the newest BeatSaver uploads")]
struct Cli {
    /// Take the maps uploaded during the last HOURS hours.
    #[arg(short = 'l', long = "last", value_name = "HOURS", default_value_t = 24)]
    hours: u32,

    /// Take the N most recent maps instead of a time window.
    #[arg(short = 'm', long = "mapnumber", value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    count: Option<u64>,

    #[arg(short = 't', long = "playlisttitle", value_name = "TITLE")]
    title: Option<String>,

    /// Directory the playlist file is written to.
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Download and unpack the playlist's maps into the maps root.
    #[arg(short = 'd', long)]
    download: bool,

    #[arg(short = 'r', long = "maps-root", value_name = "DIR")]
    maps_root: Option<PathBuf>,

    /// Delete the maps listed in --playlist-file from the maps root.
    #[arg(short = 'p', long)]
    prune: bool,

    /// Work on an existing playlist instead of building a new one.
    #[arg(short = 'f', long = "playlist-file", value_name = "FILE")]
    playlist_file: Option<PathBuf>,

    /// Where archives are staged while downloading (default: working directory).
    #[arg(long, value_name = "DIR")]
    staging_dir: Option<PathBuf>,

    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Build {
        request: WindowRequest,
        download: bool,
    },
    Install {
        playlist: PathBuf,
    },
    Prune {
        playlist: PathBuf,
    },
}

impl Mode {
    fn from_cli(cli: &Cli) -> std::result::Result<Self, BsmhError> {
        if cli.download && cli.prune {
            return Err(BsmhError::Config(
                "--download and --prune cannot be combined".into(),
            ));
        }
        match (&cli.playlist_file, cli.download, cli.prune) {
            (Some(playlist), true, _) => Ok(Self::Install {
                playlist: playlist.clone(),
            }),
            (Some(playlist), _, true) => Ok(Self::Prune {
                playlist: playlist.clone(),
            }),
            (Some(_), false, false) => Err(BsmhError::Config(
                "--playlist-file needs --download or --prune".into(),
            )),
            (None, _, true) => Err(BsmhError::Config(
                "--prune requires --playlist-file".into(),
            )),
            (None, download, false) => Ok(Self::Build {
                request: cli.window_request(),
                download,
            }),
        }
    }

    fn needs_maps_root(&self) -> bool {
        !matches!(self, Self::Build { download: false, .. })
    }
}

impl Cli {
    fn window_request(&self) -> WindowRequest {
        match self.count {
            Some(count) => WindowRequest::Count(count as usize),
            None => WindowRequest::Hours(self.hours),
        }
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            title: self.title.clone(),
            hours: self.hours,
            count: self.count.map(|count| count as usize),
        }
    }

    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            base_url: self.base_url.clone(),
            maps_root: self.maps_root.clone(),
            playlist_dir: self.output_dir.clone(),
            env_path: self.env_file.clone(),
        }
    }
}

/// The maps root must already exist; it is usually the game's
/// `CustomLevels` folder and creating it elsewhere would hide a typo.
fn require_maps_root(maps_root: Option<&Path>) -> std::result::Result<PathBuf, BsmhError> {
    let root = maps_root.ok_or_else(|| {
        BsmhError::Config("a maps root is required (--maps-root or BSMH_MAPS_ROOT)".into())
    })?;
    if !root.is_dir() {
        return Err(BsmhError::Config(format!(
            "maps directory {} does not exist",
            root.display()
        )));
    }
    Ok(root.to_path_buf())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = resolve_runtime_settings(cli.overrides())?;
    let mode = Mode::from_cli(&cli)?;
    let maps_root = if mode.needs_maps_root() {
        Some(require_maps_root(settings.maps_root.as_deref())?)
    } else {
        None
    };
    let catalog = BeatSaverClient::new(&settings.base_url, &settings.user_agent);

    println!("BSMH maps handler v{}", env!("CARGO_PKG_VERSION"));
    println!("Catalog: {}", settings.base_url);
    if let Some(root) = &maps_root {
        println!("Maps root: {}", root.display());
    }
    println!();

    match mode {
        Mode::Build { request, download } => {
            let Some(document) = build_playlist(&catalog, request, &cli.build_options(), &settings)?
            else {
                return Ok(());
            };
            if let Some(root) = maps_root.filter(|_| download) {
                install(&catalog, &document, &root, cli.staging_dir.as_deref())?;
            }
        }
        Mode::Install { playlist } => {
            let document = PlaylistDocument::load(&playlist)?;
            let root = maps_root.context("maps root not resolved")?;
            install(&catalog, &document, &root, cli.staging_dir.as_deref())?;
        }
        Mode::Prune { playlist } => {
            let document = PlaylistDocument::load(&playlist)?;
            let root = maps_root.context("maps root not resolved")?;
            println!(
                "Pruning {} map(s) listed in {}",
                document.entries.len(),
                playlist.display()
            );
            let report = prune(&catalog, &document, &root)?;
            println!();
            println!("Prune complete: {}", report.summary());
        }
    }

    Ok(())
}

/// Resolves the window, writes the playlist and returns it. `None` means
/// nothing qualified and no file was written.
fn build_playlist(
    catalog: &BeatSaverClient,
    request: WindowRequest,
    options: &BuildOptions,
    settings: &RuntimeSettings,
) -> Result<Option<PlaylistDocument>> {
    let now = Utc::now();
    let entries = window::resolve(catalog, request, now).context("fetching the latest maps")?;
    let written = playlist::build_and_write(&entries, options, now, &settings.playlist_dir)
        .context("writing playlist")?;
    let Some((document, path)) = written else {
        println!("Nothing to do: no map matches the requested window.");
        return Ok(None);
    };
    println!(
        "Playlist {} written with {} map(s)",
        path.display(),
        document.entries.len()
    );
    Ok(Some(document))
}

fn install(
    catalog: &BeatSaverClient,
    document: &PlaylistDocument,
    maps_root: &Path,
    staging_dir: Option<&Path>,
) -> Result<()> {
    let staging_dir = match staging_dir {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir().context("locating working directory")?,
    };
    println!();
    println!("Installing {} map(s)", document.entries.len());
    let report = ArchivePipeline::new(catalog, maps_root, staging_dir).run(document)?;
    println!();
    println!("Download complete: {}", report.summary());
    Ok(())
}
