/// Lumen - media import synchronization
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use lumen_cli::{build_manager, rediscover_sources, CliConfig};
use lumen_core::{media_types, ImportTrigger, MediaType, Source};
use lumen_storage::items;
use lumen_sync::{ImportManager, JobState};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Synchronize media folders into a local library", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known sources
    Sources,
    /// List imports
    Imports {
        /// Only imports of this source
        #[arg(long)]
        source: Option<String>,
    },
    /// List library items of a media type
    Items {
        /// Media type
        media_type: String,
    },
    /// Register a media folder as source and import it
    AddSource {
        /// Folder path
        dir: PathBuf,
        /// Display name (defaults to the folder name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Declare imports of a source
    AddImport {
        /// Source identifier
        source: String,
        /// Import path
        path: String,
        /// Media types to import
        #[arg(required = true)]
        media_types: Vec<String>,
    },
    /// Remove an import and every item imported by it
    RemoveImport {
        /// Import path
        path: String,
        /// Media type
        media_type: String,
    },
    /// Remove a source, its imports and their items
    RemoveSource {
        /// Source identifier
        source: String,
    },
    /// Synchronize imports
    Sync {
        /// Only this source
        #[arg(long, conflicts_with = "path")]
        source: Option<String>,
        /// Only the imports at this path
        #[arg(long, requires = "media_type")]
        path: Option<String>,
        /// Media type of the import at `--path`
        #[arg(long, requires = "path")]
        media_type: Option<String>,
    },
    /// Change the settings of an import
    Settings {
        /// Import path
        path: String,
        /// Media type
        media_type: String,
        /// auto or manual
        #[arg(long, value_parser = parse_trigger)]
        trigger: Option<ImportTrigger>,
        #[arg(long)]
        update_items: Option<bool>,
        #[arg(long)]
        playback_from_source: Option<bool>,
        #[arg(long)]
        playback_on_source: Option<bool>,
    },
    /// Mark an item as played and push the change to its source
    Played {
        /// Media type
        media_type: String,
        /// Item identifier
        identifier: String,
    },
}

fn parse_trigger(value: &str) -> Result<ImportTrigger, String> {
    match value {
        "auto" => Ok(ImportTrigger::Auto),
        "manual" => Ok(ImportTrigger::Manual),
        other => Err(format!("unknown trigger '{other}', expected auto or manual")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumen=info,lumen_cli=info,lumen_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    let (manager, pool) = build_manager(&config).await?;
    let reporter = spawn_progress_reporter(&manager);

    let result = run(cli.command, &manager, &pool).await;

    manager.wait_idle().await;
    manager.shutdown().await;
    reporter.abort();
    pool.close().await;

    result
}

async fn run(command: Commands, manager: &ImportManager, pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    match command {
        Commands::Sources => {
            for source in manager.get_sources(None).await {
                let synced = source
                    .last_synced
                    .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
                let media_types: Vec<&str> =
                    source.available_media_types.iter().map(MediaType::as_str).collect();
                println!(
                    "{}  {}  [{}]  last synced: {}",
                    source.identifier,
                    source.friendly_name,
                    media_types.join(", "),
                    synced
                );
            }
        }
        Commands::Imports { source } => {
            let imports = match source {
                Some(source) => manager.get_imports_by_source(&source).await,
                None => manager.get_imports().await,
            };
            for import in imports {
                println!(
                    "{}  trigger: {}  last synced: {}",
                    import.key(),
                    import.settings.import_trigger,
                    import
                        .last_synced
                        .map_or_else(|| "never".to_string(), |at| at.to_rfc3339())
                );
            }
        }
        Commands::Items { media_type } => {
            for item in items::get_by_media_type(pool, &MediaType::new(media_type)).await? {
                let year = item.year.map(|y| format!(" ({y})")).unwrap_or_default();
                let state = if item.enabled { "" } else { "  [disabled]" };
                println!(
                    "#{}  {}{}  plays: {}{}",
                    item.library_id.unwrap_or_default(),
                    item.title,
                    year,
                    item.playback.play_count,
                    state
                );
            }
        }
        Commands::AddSource { dir, name } => {
            let dir = dir
                .canonicalize()
                .with_context(|| format!("cannot open {}", dir.display()))?;
            let identifier = dir.to_string_lossy().into_owned();
            let name = name.unwrap_or_else(|| {
                dir.file_name()
                    .map_or_else(|| identifier.clone(), |n| n.to_string_lossy().into_owned())
            });

            let source = Source::new(identifier, name).with_media_types(
                [
                    media_types::MOVIE,
                    media_types::TVSHOW,
                    media_types::SEASON,
                    media_types::EPISODE,
                ]
                .map(MediaType::new),
            );
            rediscover_sources(manager).await?;
            manager.wait_idle().await;
            manager.register_source(source).await?;
        }
        Commands::AddImport {
            source,
            path,
            media_types,
        } => {
            rediscover_sources(manager).await?;
            let media_types: Vec<MediaType> = media_types.into_iter().map(MediaType::new).collect();
            let added = manager.add_imports(&source, &path, &media_types).await?;
            if added.is_empty() {
                println!("Nothing to add");
            }
            for import in added {
                println!("Added {}", import.key());
            }
        }
        Commands::RemoveImport { path, media_type } => {
            let removed = manager
                .remove_import(&path, &MediaType::new(media_type))
                .await?;
            for import in removed {
                println!("Removed {}", import.key());
            }
        }
        Commands::RemoveSource { source } => {
            manager.remove_source(&source).await?;
            println!("Removed {source}");
        }
        Commands::Sync {
            source,
            path,
            media_type,
        } => {
            let reachable = rediscover_sources(manager).await?;
            manager.wait_idle().await;

            match (source, path, media_type) {
                (Some(source), _, _) => {
                    if !manager.import_source(&source).await? {
                        println!("Source {source} has nothing to synchronize");
                    }
                }
                (None, Some(path), Some(media_type)) => {
                    manager.import_path(&path, &MediaType::new(media_type)).await?;
                }
                _ if !manager.config().sync_on_register => {
                    manager.import_all().await?;
                }
                _ => println!("Synchronized {reachable} sources"),
            }
        }
        Commands::Settings {
            path,
            media_type,
            trigger,
            update_items,
            playback_from_source,
            playback_on_source,
        } => {
            let media_type = MediaType::new(media_type);
            let import = manager
                .get_import(&path, &media_type)
                .await
                .with_context(|| format!("no import {path} [{media_type}]"))?;

            let mut settings = import.settings;
            if let Some(trigger) = trigger {
                settings.import_trigger = trigger;
            }
            if let Some(value) = update_items {
                settings.update_imported_items = value;
            }
            if let Some(value) = playback_from_source {
                settings.update_playback_metadata_from_source = value;
            }
            if let Some(value) = playback_on_source {
                settings.update_playback_metadata_on_source = value;
            }

            let import = manager.update_import(&path, &media_type, settings).await?;
            println!("{}", serde_json::to_string_pretty(&import.settings)?);
        }
        Commands::Played {
            media_type,
            identifier,
        } => {
            rediscover_sources(manager).await?;
            manager.wait_idle().await;

            let mut item = items::get_by_media_type(pool, &MediaType::new(media_type))
                .await?
                .into_iter()
                .find(|item| item.identifier == identifier)
                .with_context(|| format!("no item {identifier}"))?;

            item.playback.play_count += 1;
            item.playback.last_played = Some(Utc::now());
            item.playback.resume_position_ms = None;

            let id = item
                .library_id
                .as_deref()
                .and_then(|id| id.parse().ok())
                .context("item has no library id")?;
            items::update(pool, id, &item).await?;

            if !manager.update_imported_item(item).await? {
                println!("Source does not accept playback updates");
            }
        }
    }

    Ok(())
}

fn spawn_progress_reporter(manager: &ImportManager) -> tokio::task::JoinHandle<()> {
    let mut progress = manager.subscribe_progress();
    tokio::spawn(async move {
        while let Ok(update) = progress.recv().await {
            match update.state {
                JobState::Running if update.total_items > 0 => println!(
                    "{}  {}  {}/{}",
                    update.key,
                    update.task.as_deref().unwrap_or("-"),
                    update.processed_items,
                    update.total_items
                ),
                JobState::Completed | JobState::Failed | JobState::Cancelled => {
                    println!("{}  {}", update.key, update.state);
                }
                _ => {}
            }
        }
    })
}
