//! End-to-end synchronization of a media folder into the `SQLite` library

use lumen_cli::config::StorageSettings;
use lumen_cli::{build_manager, rediscover_sources, CliConfig};
use lumen_core::{media_types, MediaItem, MediaType, PlaybackInfo, Source};
use lumen_storage::items;
use lumen_sync::ImportManager;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    media: PathBuf,
    config: CliConfig,
    _dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        let media = media.canonicalize().unwrap();

        let config = CliConfig {
            storage: StorageSettings {
                database_url: format!("sqlite://{}", dir.path().join("library.db").display()),
            },
            ..CliConfig::default()
        };

        Self {
            media,
            config,
            _dir: dir,
        }
    }

    fn touch(&self, relative: &str) -> PathBuf {
        let path = self.media.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn source(&self) -> Source {
        Source::new(self.media.to_string_lossy(), "Media").with_media_types(
            [
                media_types::MOVIE,
                media_types::TVSHOW,
                media_types::SEASON,
                media_types::EPISODE,
            ]
            .map(MediaType::new),
        )
    }

    async fn start(&self) -> (ImportManager, SqlitePool) {
        build_manager(&self.config).await.expect("Failed to build manager")
    }
}

async fn titles(pool: &SqlitePool, media_type: &str) -> Vec<String> {
    let mut titles: Vec<String> = items::get_by_media_type(pool, &MediaType::new(media_type))
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.title)
        .collect();
    titles.sort();
    titles
}

async fn find(pool: &SqlitePool, media_type: &str, identifier: &Path) -> MediaItem {
    let identifier = identifier.to_string_lossy();
    items::get_by_media_type(pool, &MediaType::new(media_type))
        .await
        .unwrap()
        .into_iter()
        .find(|item| item.identifier == identifier)
        .expect("item not in library")
}

#[tokio::test]
async fn test_register_folder_imports_movies_and_shows() {
    let fixture = Fixture::new();
    fixture.touch("Movies/Alien (1979).mkv");
    fixture.touch("Movies/Heat (1995).mp4");
    fixture.touch("Shows/Firefly (2002)/Season 1/S01E01 Serenity.mkv");
    fixture.touch("Shows/Firefly (2002)/Season 1/S01E02 The Train Job.mkv");
    fixture.touch("Shows/Firefly (2002)/Season 1/notes.txt");

    let (manager, pool) = fixture.start().await;
    assert!(manager.register_source(fixture.source()).await.unwrap());
    manager.wait_idle().await;

    assert_eq!(manager.get_imports().await.len(), 4);
    assert_eq!(titles(&pool, media_types::MOVIE).await, vec!["Alien", "Heat"]);
    assert_eq!(titles(&pool, media_types::TVSHOW).await, vec!["Firefly"]);
    assert_eq!(titles(&pool, media_types::SEASON).await, vec!["Season 1"]);
    assert_eq!(
        titles(&pool, media_types::EPISODE).await,
        vec!["Serenity", "The Train Job"]
    );

    let source = manager.get_source(&fixture.source().identifier).await.unwrap();
    assert!(source.active);
    assert!(source.last_synced.is_some());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_resync_after_restart_applies_folder_changes() {
    let fixture = Fixture::new();
    fixture.touch("Movies/Alien (1979).mkv");
    let gone = fixture.touch("Movies/Heat (1995).mp4");
    fixture.touch("Shows/Firefly (2002)/Season 1/S01E01 Serenity.mkv");
    let last_of_season = fixture.touch("Shows/Firefly (2002)/Season 2/S02E01.mkv");

    {
        let (manager, pool) = fixture.start().await;
        manager.register_source(fixture.source()).await.unwrap();
        manager.wait_idle().await;
        assert_eq!(titles(&pool, media_types::SEASON).await.len(), 2);
        manager.shutdown().await;
        pool.close().await;
    }

    std::fs::remove_file(gone).unwrap();
    std::fs::remove_file(last_of_season).unwrap();
    fixture.touch("Movies/Ronin (1998).mkv");

    let (manager, pool) = fixture.start().await;
    let source = manager.get_source(&fixture.source().identifier).await.unwrap();
    assert!(!source.active);

    assert_eq!(rediscover_sources(&manager).await.unwrap(), 1);
    manager.wait_idle().await;

    assert_eq!(titles(&pool, media_types::MOVIE).await, vec!["Alien", "Ronin"]);
    assert_eq!(titles(&pool, media_types::SEASON).await, vec!["Season 1"]);
    assert_eq!(titles(&pool, media_types::EPISODE).await, vec!["Serenity"]);
    assert_eq!(titles(&pool, media_types::TVSHOW).await, vec!["Firefly"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_empty_show_is_removed() {
    let fixture = Fixture::new();
    let episode = fixture.touch("Shows/Firefly (2002)/Season 1/S01E01 Serenity.mkv");

    let (manager, pool) = fixture.start().await;
    manager.register_source(fixture.source()).await.unwrap();
    manager.wait_idle().await;
    assert_eq!(titles(&pool, media_types::TVSHOW).await, vec!["Firefly"]);

    std::fs::remove_file(episode).unwrap();
    assert!(manager.import_all().await.unwrap() > 0);
    manager.wait_idle().await;

    assert!(titles(&pool, media_types::EPISODE).await.is_empty());
    assert!(titles(&pool, media_types::SEASON).await.is_empty());
    assert!(titles(&pool, media_types::TVSHOW).await.is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_remove_source_clears_library() {
    let fixture = Fixture::new();
    fixture.touch("Movies/Alien (1979).mkv");
    fixture.touch("Shows/Firefly (2002)/Season 1/S01E01 Serenity.mkv");

    let (manager, pool) = fixture.start().await;
    manager.register_source(fixture.source()).await.unwrap();
    manager.wait_idle().await;

    manager
        .remove_source(&fixture.source().identifier)
        .await
        .unwrap();

    assert!(manager.get_sources(None).await.is_empty());
    assert!(manager.get_imports().await.is_empty());
    for media_type in [
        media_types::MOVIE,
        media_types::TVSHOW,
        media_types::SEASON,
        media_types::EPISODE,
    ] {
        assert!(titles(&pool, media_type).await.is_empty(), "{media_type} left behind");
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn test_remove_show_import_takes_grouped_types_along() {
    let fixture = Fixture::new();
    fixture.touch("Movies/Alien (1979).mkv");
    fixture.touch("Shows/Firefly (2002)/Season 1/S01E01 Serenity.mkv");

    let (manager, pool) = fixture.start().await;
    manager.register_source(fixture.source()).await.unwrap();
    manager.wait_idle().await;

    let removed = manager
        .remove_import(
            &fixture.source().identifier,
            &MediaType::new(media_types::TVSHOW),
        )
        .await
        .unwrap();
    assert_eq!(removed.len(), 3);

    let remaining = manager.get_imports().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].media_type, media_types::MOVIE);
    assert_eq!(titles(&pool, media_types::MOVIE).await, vec!["Alien"]);
    assert!(titles(&pool, media_types::EPISODE).await.is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_unregister_disables_items() {
    let fixture = Fixture::new();
    let alien = fixture.touch("Movies/Alien (1979).mkv");

    let (manager, pool) = fixture.start().await;
    manager.register_source(fixture.source()).await.unwrap();
    manager.wait_idle().await;

    manager
        .unregister_source(&fixture.source().identifier)
        .await
        .unwrap();
    assert!(!find(&pool, media_types::MOVIE, &alien).await.enabled);

    rediscover_sources(&manager).await.unwrap();
    manager.wait_idle().await;
    assert!(find(&pool, media_types::MOVIE, &alien).await.enabled);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_playback_is_written_back_to_sidecar() {
    let fixture = Fixture::new();
    let alien = fixture.touch("Movies/Alien (1979).mkv");

    let (manager, pool) = fixture.start().await;
    manager.register_source(fixture.source()).await.unwrap();
    manager.wait_idle().await;

    let mut item = find(&pool, media_types::MOVIE, &alien).await;
    item.playback.play_count = 2;
    item.playback.resume_position_ms = Some(90_000);
    let id: i64 = item.library_id.as_deref().unwrap().parse().unwrap();
    items::update(&pool, id, &item).await.unwrap();

    assert!(manager.update_imported_item(item).await.unwrap());
    manager.wait_idle().await;

    let mut sidecar = alien.into_os_string();
    sidecar.push(".lumen.json");
    let document = std::fs::read_to_string(sidecar).unwrap();
    let playback: PlaybackInfo = serde_json::from_str(&document).unwrap();
    assert_eq!(playback.play_count, 2);
    assert_eq!(playback.resume_position_ms, Some(90_000));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_sidecar_playback_is_imported() {
    let fixture = Fixture::new();
    let alien = fixture.touch("Movies/Alien (1979).mkv");
    let mut sidecar = alien.clone().into_os_string();
    sidecar.push(".lumen.json");
    let playback = PlaybackInfo {
        play_count: 5,
        ..PlaybackInfo::default()
    };
    std::fs::write(sidecar, serde_json::to_string(&playback).unwrap()).unwrap();

    let (manager, pool) = fixture.start().await;
    manager.register_source(fixture.source()).await.unwrap();
    manager.wait_idle().await;

    assert_eq!(find(&pool, media_types::MOVIE, &alien).await.playback.play_count, 5);

    manager.shutdown().await;
}
