//! Configuration for photosync-ingest
//!
//! Settings come from the command line, `PHOTOSYNC_*` environment
//! variables, the TOML file and compiled defaults, in that order. The
//! resolved [`IngestConfig`] is what the binary hands to the coordinator.

use crate::services::banned_names::BannedNames;
use crate::services::date_range::DateRange;
use crate::services::folder_source::{FolderAlbum, FolderOptions};
use crate::services::group_filters::{
    BurstPolicy, FileTypeInclusion, GroupFilters, HeicJpgPolicy, RawJpgPolicy,
};
use crate::services::http_client::DEFAULT_TIMEOUT;
use crate::services::upload_coordinator::{
    default_concurrency, session_tag, ErrorTolerance, UploadOptions, MAX_CONCURRENCY,
};
use crate::services::bulk_tagger::DEFAULT_TAG_BATCH;
use crate::services::collection_cache::DEFAULT_MAX_BATCH;
use chrono::{DateTime, Local};
use chrono_tz::Tz;
use clap::Parser;
use photosync_common::config::{env_var_name, load_toml_or_default, resolve, LoggingConfig};
use photosync_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Name used for the TOML file and the log target
pub const MODULE_NAME: &str = "photosync-ingest";

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(name = "photosync-ingest")]
#[command(about = "Upload photo and video folders to a photo server")]
#[command(version)]
pub struct Cli {
    /// Folders to upload
    pub paths: Vec<PathBuf>,

    /// TOML config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Photo server URL
    #[arg(short, long, env = "PHOTOSYNC_SERVER")]
    pub server: Option<String>,

    /// API key of the server account
    #[arg(short = 'k', long, env = "PHOTOSYNC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Groups uploaded in parallel (1 to 20)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Replace server assets even when they look the same
    #[arg(long)]
    pub overwrite: bool,

    /// Pause the server's background jobs during the upload
    #[arg(long)]
    pub pause_server_jobs: bool,

    /// Time zone of the dates found in file names (IANA name)
    #[arg(long)]
    pub time_zone: Option<String>,

    /// Tag added to every uploaded asset, may be repeated
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Tag the assets with the run's start time
    #[arg(long)]
    pub session_tag: bool,

    /// Capture dates to keep: YYYY, YYYY-MM, YYYY-MM-DD or FROM,TO
    #[arg(long)]
    pub date_range: Option<String>,

    /// Extensions to upload, comma separated
    #[arg(long)]
    pub include_extensions: Option<String>,

    /// Extensions to skip, comma separated
    #[arg(long)]
    pub exclude_extensions: Option<String>,

    /// File name pattern to ignore, may be repeated
    #[arg(long = "ban-file", value_name = "PATTERN")]
    pub ban_files: Vec<String>,

    /// nostack, stack, stackkeepraw or stackkeepjpeg
    #[arg(long)]
    pub burst_policy: Option<String>,

    /// keepraw, keepjpg, stackcoverraw or stackcoverjpg
    #[arg(long)]
    pub raw_jpg: Option<String>,

    /// keepheic, keepjpg, stackcoverheic or stackcoverjpg
    #[arg(long)]
    pub heic_jpg: Option<String>,

    /// Group Epson FastFoto scans
    #[arg(long)]
    pub epson_fastfoto: bool,

    /// NONE, FOLDER or PATH
    #[arg(long)]
    pub folder_as_album: Option<String>,

    /// Tag assets with their folder path
    #[arg(long)]
    pub folder_as_tags: bool,

    /// Album receiving every asset
    #[arg(long)]
    pub into_album: Option<String>,

    /// Only read the top level of each folder
    #[arg(long)]
    pub no_recursive: bool,

    /// stop, continue, or the number of errors tolerated
    #[arg(long)]
    pub on_errors: Option<String>,

    /// Album members sent per request
    #[arg(long)]
    pub album_batch: Option<usize>,

    /// Seconds before a server call is abandoned
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Log what would be done without changing the server
    #[arg(long)]
    pub dry_run: bool,

    /// trace, debug, info, warn or error
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Content of the TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: Option<String>,
    pub api_key: Option<String>,
    pub concurrency: Option<usize>,
    pub overwrite: Option<bool>,
    pub pause_server_jobs: Option<bool>,
    pub time_zone: Option<String>,
    pub tags: Vec<String>,
    pub session_tag: Option<bool>,
    pub date_range: Option<String>,
    pub include_extensions: Option<String>,
    pub exclude_extensions: Option<String>,
    pub banned_files: Vec<String>,
    pub burst_policy: Option<String>,
    pub raw_jpg: Option<String>,
    pub heic_jpg: Option<String>,
    pub epson_fastfoto: Option<bool>,
    pub folder_as_album: Option<String>,
    pub folder_as_tags: Option<bool>,
    pub into_album: Option<String>,
    pub recursive: Option<bool>,
    pub on_errors: Option<String>,
    pub album_batch: Option<usize>,
    pub tag_batch: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub dry_run: Option<bool>,
    pub logging: LoggingConfig,
}

/// Resolved settings of a run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub server: String,
    pub api_key: String,
    pub time_zone: Option<Tz>,
    pub timeout: Duration,
    pub dry_run: bool,
    pub upload: UploadOptions,
    pub folder: FolderOptions,
    pub logging: LoggingConfig,
}

/// Resolve a setting given as a flag string, then parse it
fn resolve_parsed<T>(key: &str, cli: Option<String>, toml: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = resolve(cli, &env_var_name(key), toml, String::new())?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| Error::Config(format!("{}: {}", key, e)))
}

/// Resolve an on/off setting; a CLI flag can only turn it on
fn resolve_flag(key: &str, cli: bool, toml: Option<bool>, default: bool) -> Result<bool> {
    resolve(cli.then_some(true), &env_var_name(key), toml, default)
}

impl IngestConfig {
    /// Read the TOML file named by `--config` (or the default one) and resolve
    pub fn load(cli: Cli) -> Result<Self> {
        let toml: TomlConfig = load_toml_or_default(cli.config.as_deref(), MODULE_NAME);
        Self::resolve(cli, toml, Local::now())
    }

    /// Resolve every setting
    ///
    /// # Arguments
    /// * `cli` - Parsed command line
    /// * `toml` - Parsed TOML file, or its default
    /// * `start` - Run start time, used by the session tag
    pub fn resolve(cli: Cli, toml: TomlConfig, start: DateTime<Local>) -> Result<Self> {
        let server = cli.server.or(toml.server).unwrap_or_default();
        if server.trim().is_empty() {
            return Err(Error::Config(
                "server URL not configured, use --server or PHOTOSYNC_SERVER".to_string(),
            ));
        }
        let api_key = cli.api_key.or(toml.api_key).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(Error::Config(
                "API key not configured, use --api-key or PHOTOSYNC_API_KEY".to_string(),
            ));
        }

        let concurrency = resolve(
            cli.concurrency,
            &env_var_name("concurrency"),
            toml.concurrency,
            default_concurrency(),
        )?;
        if concurrency == 0 || concurrency > MAX_CONCURRENCY {
            warn!(
                requested = concurrency,
                "Concurrency out of range, clamped to [1, {}]",
                MAX_CONCURRENCY
            );
        }

        let time_zone: Option<Tz> = resolve_parsed("time-zone", cli.time_zone, toml.time_zone)?;

        let mut banned = BannedNames::defaults();
        for pattern in cli.ban_files.iter().chain(toml.banned_files.iter()) {
            banned.push(pattern)?;
        }

        let include = resolve(
            cli.include_extensions,
            &env_var_name("include-extensions"),
            toml.include_extensions,
            String::new(),
        )?;
        let exclude = resolve(
            cli.exclude_extensions,
            &env_var_name("exclude-extensions"),
            toml.exclude_extensions,
            String::new(),
        )?;
        let file_types = FileTypeInclusion::from_lists(&include, &exclude);

        let date_range: DateRange =
            resolve_parsed("date-range", cli.date_range, toml.date_range)?.unwrap_or_default();
        let burst: BurstPolicy =
            resolve_parsed("burst-policy", cli.burst_policy, toml.burst_policy)?.unwrap_or_default();
        let raw_jpg: RawJpgPolicy =
            resolve_parsed("raw-jpg", cli.raw_jpg, toml.raw_jpg)?.unwrap_or_default();
        let heic_jpg: HeicJpgPolicy =
            resolve_parsed("heic-jpg", cli.heic_jpg, toml.heic_jpg)?.unwrap_or_default();
        let folder_as_album: FolderAlbum =
            resolve_parsed("folder-as-album", cli.folder_as_album, toml.folder_as_album)?
                .unwrap_or_default();
        let on_errors: ErrorTolerance =
            resolve_parsed("on-errors", cli.on_errors, toml.on_errors)?.unwrap_or_default();

        let mut tags = cli.tags;
        for tag in toml.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        let session = resolve_flag("session-tag", cli.session_tag, toml.session_tag, false)?
            .then(|| session_tag(start));

        let album_batch = resolve(
            cli.album_batch,
            &env_var_name("album-batch"),
            toml.album_batch,
            DEFAULT_MAX_BATCH,
        )?;
        let tag_batch = resolve(
            None,
            &env_var_name("tag-batch"),
            toml.tag_batch,
            DEFAULT_TAG_BATCH,
        )?;
        let timeout = resolve(
            cli.timeout_secs,
            &env_var_name("timeout-secs"),
            toml.timeout_secs,
            DEFAULT_TIMEOUT.as_secs(),
        )?;

        let mut logging = toml.logging;
        logging.level = resolve(
            cli.log_level,
            &env_var_name("log-level"),
            Some(logging.level.clone()),
            "info".to_string(),
        )?;

        let epson_fastfoto =
            resolve_flag("epson-fastfoto", cli.epson_fastfoto, toml.epson_fastfoto, false)?;
        let recursive = resolve(
            cli.no_recursive.then_some(false),
            &env_var_name("recursive"),
            toml.recursive,
            true,
        )?;

        let upload = UploadOptions {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            overwrite: resolve_flag("overwrite", cli.overwrite, toml.overwrite, false)?,
            pause_server_jobs: resolve_flag(
                "pause-server-jobs",
                cli.pause_server_jobs,
                toml.pause_server_jobs,
                false,
            )?,
            tags: tags.clone(),
            session_tag: session,
            filters: GroupFilters {
                banned: banned.clone(),
                file_types: file_types.clone(),
                date_range,
                burst,
                raw_jpg,
                heic_jpg,
            },
            on_errors,
            album_batch: album_batch.max(1),
            tag_batch: tag_batch.max(1),
        };

        let folder = FolderOptions {
            roots: cli.paths,
            recursive,
            banned,
            file_types,
            tags,
            folder_as_tags: resolve_flag(
                "folder-as-tags",
                cli.folder_as_tags,
                toml.folder_as_tags,
                false,
            )?,
            folder_as_album,
            into_album: cli.into_album.or(toml.into_album).filter(|a| !a.is_empty()),
            epson_fastfoto,
        };

        Ok(Self {
            server,
            api_key,
            time_zone,
            timeout: Duration::from_secs(timeout.max(1)),
            dry_run: resolve_flag("dry-run", cli.dry_run, toml.dry_run, false)?,
            upload,
            folder,
            logging,
        })
    }
}
