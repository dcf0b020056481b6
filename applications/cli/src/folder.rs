//! Folder importer
//!
//! Imports media from a local directory tree:
//!
//! ```text
//! Movies/Alien (1979).mkv                      movie "Alien" (1979)
//! Shows/Firefly (2002)/Season 1/S01E02 Train Job.mkv
//!                                              tvshow "Firefly" (2002)
//!                                              season "Season 1"
//!                                              episode "Train Job"
//! ```
//!
//! Playback state written back to the source lives in a sidecar file next
//! to the video (`Alien (1979).mkv.lumen.json`).

use async_trait::async_trait;
use lumen_core::{
    media_types, Import, Importer, ImporterFactory, LumenError, MediaItem, MediaType,
    PlaybackInfo, RetrievalContext, Result,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Supported video file extensions
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "m4v", "avi", "mov", "wmv", "webm", "ts"];

/// Suffix of playback sidecar files
const SIDECAR_SUFFIX: &str = ".lumen.json";

/// Importer factory for local directories
#[derive(Debug, Default)]
pub struct FolderImporterFactory;

impl FolderImporterFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImporterFactory for FolderImporterFactory {
    fn protocol(&self) -> &str {
        "folder"
    }

    async fn can_import(&self, path: &str) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    fn create(&self, import: &Import) -> Result<Box<dyn Importer>> {
        Ok(Box::new(FolderImporter {
            root: PathBuf::from(&import.path),
        }))
    }

    fn can_update_playcount_on_source(&self, _path: &str) -> bool {
        true
    }

    fn can_update_last_played_on_source(&self, _path: &str) -> bool {
        true
    }

    fn can_update_resume_position_on_source(&self, _path: &str) -> bool {
        true
    }
}

/// Importer instance for one directory
#[derive(Debug)]
pub struct FolderImporter {
    root: PathBuf,
}

#[async_trait]
impl Importer for FolderImporter {
    async fn import(&mut self, ctx: &mut RetrievalContext<'_>) -> Result<()> {
        let media_type = ctx.import().media_type.clone();
        let root = self.root.clone();

        let files = tokio::task::spawn_blocking(move || scan_videos(&root))
            .await
            .map_err(|e| LumenError::plugin(format!("scan task failed: {e}")))??;

        let layout = FolderLayout::from_files(&files);
        let total = files.len();
        debug!(
            "Found {} videos below {} ({} movies, {} episodes)",
            total,
            self.root.display(),
            layout.movies.len(),
            layout.episodes.len()
        );

        let items = layout.items(&media_type);
        let count = items.len();
        for (index, mut item) in items.into_iter().enumerate() {
            if ctx.should_cancel() {
                return Err(LumenError::Cancelled);
            }
            if item.media_type == media_types::MOVIE || item.media_type == media_types::EPISODE {
                if let Some(playback) = read_sidecar(Path::new(&item.identifier)).await {
                    item.playback = playback;
                }
            }
            ctx.push_item(item);
            ctx.set_progress(index + 1, count);
        }

        Ok(())
    }

    async fn update_on_source(&mut self, item: &MediaItem) -> Result<()> {
        let video = Path::new(&item.identifier);
        if !video.starts_with(&self.root) {
            return Err(LumenError::invalid_input(format!(
                "{} is not below {}",
                item.identifier,
                self.root.display()
            )));
        }
        if !tokio::fs::try_exists(video).await? {
            return Err(LumenError::not_found("video", item.identifier.clone()));
        }

        let document = serde_json::to_string_pretty(&item.playback)?;
        tokio::fs::write(sidecar_path(video), document).await?;
        debug!("Wrote playback state of {}", item.identifier);
        Ok(())
    }
}

/// Every video file below `root`, sorted
fn scan_videos(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(LumenError::not_found("directory", root.display().to_string()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_video_file(p))
        .collect();

    files.sort();
    Ok(files)
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn sidecar_path(video: &Path) -> PathBuf {
    let mut name = video.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

async fn read_sidecar(video: &Path) -> Option<PlaybackInfo> {
    let path = sidecar_path(video);
    let document = tokio::fs::read_to_string(&path).await.ok()?;
    match serde_json::from_str(&document) {
        Ok(playback) => Some(playback),
        Err(e) => {
            warn!("Ignoring unreadable sidecar {}: {}", path.display(), e);
            None
        }
    }
}

/// Movies and show hierarchy recognized in a list of video files
#[derive(Debug, Default)]
struct FolderLayout {
    movies: Vec<MediaItem>,
    /// Keyed by identifier so every show and season is listed once
    shows: BTreeMap<String, MediaItem>,
    seasons: BTreeMap<String, MediaItem>,
    episodes: Vec<MediaItem>,
}

impl FolderLayout {
    fn from_files(files: &[PathBuf]) -> Self {
        let mut layout = Self::default();

        for file in files {
            match parse_episode_path(file) {
                Some(episode) => layout.add_episode(file, episode),
                None => layout.movies.push(movie_item(file)),
            }
        }

        layout
    }

    fn add_episode(&mut self, file: &Path, episode: EpisodePath) {
        let show_id = path_string(&episode.show_dir);
        let season_id = path_string(&episode.season_dir);

        self.shows.entry(show_id.clone()).or_insert_with(|| {
            let (title, year) = split_title_year(&file_name(&episode.show_dir));
            let show = MediaItem::new(show_id.clone(), media_types::TVSHOW, title);
            match year {
                Some(year) => show.with_year(year),
                None => show,
            }
        });

        self.seasons.entry(season_id.clone()).or_insert_with(|| {
            MediaItem::new(
                season_id.clone(),
                media_types::SEASON,
                format!("Season {}", episode.season),
            )
            .with_parent(show_id.clone())
            .with_metadata("season", episode.season)
        });

        let title = if episode.title.is_empty() {
            format!("Episode {}", episode.episode)
        } else {
            episode.title
        };
        self.episodes.push(
            MediaItem::new(path_string(file), media_types::EPISODE, title)
                .with_parent(season_id)
                .with_metadata("season", episode.season)
                .with_metadata("episode", episode.episode),
        );
    }

    fn items(self, media_type: &MediaType) -> Vec<MediaItem> {
        match media_type.as_str() {
            media_types::MOVIE => self.movies,
            media_types::TVSHOW => self.shows.into_values().collect(),
            media_types::SEASON => self.seasons.into_values().collect(),
            media_types::EPISODE => self.episodes,
            _ => Vec::new(),
        }
    }
}

fn movie_item(file: &Path) -> MediaItem {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (title, year) = split_title_year(&stem);
    let movie = MediaItem::new(path_string(file), media_types::MOVIE, title);
    match year {
        Some(year) => movie.with_year(year),
        None => movie,
    }
}

#[derive(Debug, PartialEq)]
struct EpisodePath {
    show_dir: PathBuf,
    season_dir: PathBuf,
    season: u32,
    episode: u32,
    title: String,
}

/// Recognize `Show/Season N/SxxEyy Title.ext`
fn parse_episode_path(file: &Path) -> Option<EpisodePath> {
    let season_dir = file.parent()?;
    let show_dir = season_dir.parent()?;
    let dir_season = parse_season_dir(&file_name(season_dir))?;

    let stem = file.file_stem()?.to_string_lossy();
    let (season, episode, title) = parse_episode_name(&stem)?;
    if season != dir_season {
        return None;
    }

    Some(EpisodePath {
        show_dir: show_dir.to_path_buf(),
        season_dir: season_dir.to_path_buf(),
        season,
        episode,
        title,
    })
}

/// `Season 3` -> 3
fn parse_season_dir(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let number = lower.strip_prefix("season")?.trim();
    number.parse().ok()
}

/// `S01E02 - Title` -> (1, 2, "Title")
fn parse_episode_name(stem: &str) -> Option<(u32, u32, String)> {
    let rest = stem.strip_prefix(['S', 's'])?;
    let season_len = rest.find(|c: char| !c.is_ascii_digit())?;
    let season = rest[..season_len].parse().ok()?;

    let rest = rest[season_len..].strip_prefix(['E', 'e'])?;
    let episode_len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let episode = rest[..episode_len].parse().ok()?;

    let title = rest[episode_len..]
        .trim_start_matches(|c: char| c == ' ' || c == '-' || c == '.' || c == '_')
        .trim()
        .to_string();
    Some((season, episode, title))
}

/// `Alien (1979)` -> ("Alien", Some(1979))
fn split_title_year(name: &str) -> (String, Option<i32>) {
    let trimmed = name.trim();
    if let Some(open) = trimmed.rfind(" (") {
        let candidate = &trimmed[open + 2..];
        if let Some(year) = candidate.strip_suffix(')') {
            if year.len() == 4 {
                if let Ok(year) = year.parse() {
                    return (trimmed[..open].trim().to_string(), Some(year));
                }
            }
        }
    }
    (trimmed.to_string(), None)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_title_year() {
        assert_eq!(split_title_year("Alien (1979)"), ("Alien".to_string(), Some(1979)));
        assert_eq!(split_title_year("Heat"), ("Heat".to_string(), None));
        assert_eq!(
            split_title_year("Blade Runner (Final Cut)"),
            ("Blade Runner (Final Cut)".to_string(), None)
        );
    }

    #[test]
    fn test_parse_episode_name() {
        assert_eq!(
            parse_episode_name("S01E02 - The Train Job"),
            Some((1, 2, "The Train Job".to_string()))
        );
        assert_eq!(parse_episode_name("s2e10"), Some((2, 10, String::new())));
        assert_eq!(parse_episode_name("Serenity"), None);
    }

    #[test]
    fn test_parse_season_dir() {
        assert_eq!(parse_season_dir("Season 1"), Some(1));
        assert_eq!(parse_season_dir("season 12"), Some(12));
        assert_eq!(parse_season_dir("Specials"), None);
    }

    #[test]
    fn test_layout_separates_movies_and_episodes() {
        let files = vec![
            PathBuf::from("/media/Movies/Alien (1979).mkv"),
            PathBuf::from("/media/Shows/Firefly (2002)/Season 1/S01E01 Serenity.mkv"),
            PathBuf::from("/media/Shows/Firefly (2002)/Season 1/S01E02 The Train Job.mkv"),
            PathBuf::from("/media/Shows/Firefly (2002)/Season 2/S02E01.mkv"),
            // Episode name inside the wrong season folder is not an episode
            PathBuf::from("/media/Shows/Firefly (2002)/Season 2/S01E03.mkv"),
        ];
        let layout = FolderLayout::from_files(&files);

        assert_eq!(layout.movies.len(), 2);
        assert_eq!(layout.shows.len(), 1);
        assert_eq!(layout.seasons.len(), 2);
        assert_eq!(layout.episodes.len(), 3);

        let show = layout.shows.values().next().unwrap();
        assert_eq!(show.title, "Firefly");
        assert_eq!(show.year, Some(2002));

        let episode = &layout.episodes[1];
        assert_eq!(episode.title, "The Train Job");
        assert_eq!(
            episode.parent.as_deref(),
            Some("/media/Shows/Firefly (2002)/Season 1")
        );
        assert_eq!(layout.episodes[2].title, "Episode 1");
    }

    #[test]
    fn test_video_extensions() {
        assert!(is_video_file(Path::new("a.MKV")));
        assert!(is_video_file(Path::new("a.mp4")));
        assert!(!is_video_file(Path::new("a.srt")));
        assert!(!is_video_file(Path::new("a.mkv.lumen.json")));
    }
}
