//! Changeset computation
//!
//! Matches retrieved items against the locally stored items of an import
//! and classifies each as added, changed, removed or unchanged.

use crate::error::{Result, SyncError};
use lumen_core::{
    ChangesetItem, ChangesetKind, ImportSettings, MediaItem, MediaTypeHandler, ProgressCallback,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Counts per changeset kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChangesetStats {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl ChangesetStats {
    /// Count the entries of a changeset
    pub fn from_changeset(changeset: &[ChangesetItem]) -> Self {
        let mut stats = Self::default();
        for entry in changeset {
            match entry.kind {
                ChangesetKind::Added => stats.added += 1,
                ChangesetKind::Changed => stats.changed += 1,
                ChangesetKind::Removed => stats.removed += 1,
                ChangesetKind::None => stats.unchanged += 1,
            }
        }
        stats
    }

    /// Whether applying the changeset would modify the library
    pub fn has_changes(&self) -> bool {
        self.added + self.changed + self.removed > 0
    }
}

/// Classify `retrieved` against `local`.
///
/// Retrieved items come first in retrieval order, followed by every local
/// item that was not matched (in local order) as `Removed`. Cancellation
/// is checked before each retrieved item.
pub fn compute_changeset(
    handler: &dyn MediaTypeHandler,
    settings: &ImportSettings,
    retrieved: Vec<MediaItem>,
    mut local: Vec<MediaItem>,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<ChangesetItem>> {
    let total = retrieved.len();
    let mut changeset = Vec::with_capacity(retrieved.len() + local.len());

    for (index, mut item) in retrieved.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let kind = match handler.find_match(&item, &local) {
            Some(position) => {
                let matched = local.remove(position);
                item.library_id = matched.library_id.clone();
                item.enabled = matched.enabled;
                classify_match(handler, settings, &matched, &mut item)
            }
            None => ChangesetKind::Added,
        };

        changeset.push(ChangesetItem::new(kind, item));

        if let Some(progress) = progress {
            progress(index + 1, total);
        }
    }

    changeset.extend(
        local
            .into_iter()
            .map(|item| ChangesetItem::new(ChangesetKind::Removed, item)),
    );

    let stats = ChangesetStats::from_changeset(&changeset);
    debug!(
        "Changeset: {} added, {} changed, {} removed, {} unchanged",
        stats.added, stats.changed, stats.removed, stats.unchanged
    );

    Ok(changeset)
}

fn classify_match(
    handler: &dyn MediaTypeHandler,
    settings: &ImportSettings,
    local: &MediaItem,
    retrieved: &mut MediaItem,
) -> ChangesetKind {
    if !settings.update_imported_items {
        return ChangesetKind::None;
    }

    let include_playback = settings.update_playback_metadata_from_source;
    if !handler.has_changes(local, retrieved, include_playback) {
        return ChangesetKind::None;
    }

    if !include_playback {
        // Keep local playback state when applying the update
        retrieved.playback = local.playback.clone();
    }

    ChangesetKind::Changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lumen_core::{Import, MediaType, PlaybackInfo};

    struct IdentifierHandler;

    #[async_trait]
    impl MediaTypeHandler for IdentifierHandler {
        fn media_type(&self) -> MediaType {
            MediaType::new("movie")
        }

        async fn get_local_items(&self, _import: &Import) -> lumen_core::Result<Vec<MediaItem>> {
            Ok(Vec::new())
        }

        async fn add_imported_item(&self, _: &Import, _: &MediaItem) -> lumen_core::Result<()> {
            Ok(())
        }

        async fn update_imported_item(&self, _: &Import, _: &MediaItem) -> lumen_core::Result<()> {
            Ok(())
        }

        async fn remove_imported_item(&self, _: &Import, _: &MediaItem) -> lumen_core::Result<()> {
            Ok(())
        }

        async fn set_imported_items_enabled(&self, _: &Import, _: bool) -> lumen_core::Result<()> {
            Ok(())
        }
    }

    /// Matches by title and year instead of identifier
    struct TitleYearHandler;

    #[async_trait]
    impl MediaTypeHandler for TitleYearHandler {
        fn media_type(&self) -> MediaType {
            MediaType::new("tvshow")
        }

        fn find_match(&self, item: &MediaItem, local_items: &[MediaItem]) -> Option<usize> {
            local_items
                .iter()
                .position(|l| l.title == item.title && l.year == item.year)
        }

        async fn get_local_items(&self, _import: &Import) -> lumen_core::Result<Vec<MediaItem>> {
            Ok(Vec::new())
        }

        async fn add_imported_item(&self, _: &Import, _: &MediaItem) -> lumen_core::Result<()> {
            Ok(())
        }

        async fn update_imported_item(&self, _: &Import, _: &MediaItem) -> lumen_core::Result<()> {
            Ok(())
        }

        async fn remove_imported_item(&self, _: &Import, _: &MediaItem) -> lumen_core::Result<()> {
            Ok(())
        }

        async fn set_imported_items_enabled(&self, _: &Import, _: bool) -> lumen_core::Result<()> {
            Ok(())
        }
    }

    fn movie(id: &str, title: &str) -> MediaItem {
        MediaItem::new(id, "movie", title)
    }

    fn kinds(changeset: &[ChangesetItem]) -> Vec<(String, ChangesetKind)> {
        changeset
            .iter()
            .map(|c| (c.item.identifier.clone(), c.kind))
            .collect()
    }

    fn run(
        handler: &dyn MediaTypeHandler,
        settings: &ImportSettings,
        retrieved: Vec<MediaItem>,
        local: Vec<MediaItem>,
    ) -> Vec<ChangesetItem> {
        compute_changeset(handler, settings, retrieved, local, &CancellationToken::new(), None)
            .unwrap()
    }

    #[test]
    fn test_added_changed_removed() {
        let local = vec![movie("a", "A v1"), movie("b", "B")];
        let retrieved = vec![movie("a", "A v2"), movie("c", "C")];

        let changeset = run(&IdentifierHandler, &ImportSettings::default(), retrieved, local);

        assert_eq!(
            kinds(&changeset),
            vec![
                ("a".to_string(), ChangesetKind::Changed),
                ("c".to_string(), ChangesetKind::Added),
                ("b".to_string(), ChangesetKind::Removed),
            ]
        );
    }

    #[test]
    fn test_unchanged_items_are_none() {
        let items = vec![movie("a", "A"), movie("b", "B")];
        let changeset = run(&IdentifierHandler, &ImportSettings::default(), items.clone(), items);

        assert!(changeset.iter().all(|c| c.kind == ChangesetKind::None));
        assert!(!ChangesetStats::from_changeset(&changeset).has_changes());
    }

    #[test]
    fn test_update_disabled_skips_comparison() {
        let settings = ImportSettings {
            update_imported_items: false,
            ..ImportSettings::default()
        };
        let changeset = run(
            &IdentifierHandler,
            &settings,
            vec![movie("a", "Renamed")],
            vec![movie("a", "Original")],
        );

        assert_eq!(changeset[0].kind, ChangesetKind::None);
    }

    #[test]
    fn test_playback_ignored_when_not_taken_from_source() {
        let settings = ImportSettings {
            update_playback_metadata_from_source: false,
            ..ImportSettings::default()
        };
        let local = movie("a", "A").with_playback(PlaybackInfo {
            play_count: 2,
            ..PlaybackInfo::default()
        });
        let remote = movie("a", "A").with_playback(PlaybackInfo {
            play_count: 7,
            ..PlaybackInfo::default()
        });

        let changeset = run(&IdentifierHandler, &settings, vec![remote.clone()], vec![local.clone()]);
        assert_eq!(changeset[0].kind, ChangesetKind::None);

        let changeset = run(
            &IdentifierHandler,
            &settings,
            vec![remote.with_year(1999)],
            vec![local],
        );
        assert_eq!(changeset[0].kind, ChangesetKind::Changed);
        assert_eq!(changeset[0].item.playback.play_count, 2);
    }

    #[test]
    fn test_playback_change_detected_when_taken_from_source() {
        let local = movie("a", "A");
        let remote = movie("a", "A").with_playback(PlaybackInfo {
            resume_position_ms: Some(1_000),
            ..PlaybackInfo::default()
        });

        let changeset = run(&IdentifierHandler, &ImportSettings::default(), vec![remote], vec![local]);
        assert_eq!(changeset[0].kind, ChangesetKind::Changed);
    }

    #[test]
    fn test_matched_item_inherits_library_id() {
        let mut local = movie("a", "A");
        local.library_id = Some("17".to_string());

        let changeset = run(
            &IdentifierHandler,
            &ImportSettings::default(),
            vec![movie("a", "A2")],
            vec![local],
        );
        assert_eq!(changeset[0].item.library_id.as_deref(), Some("17"));
    }

    #[test]
    fn test_composite_key_matching() {
        let local = vec![
            MediaItem::new("old://1", "tvshow", "Firefly").with_year(2002),
            MediaItem::new("old://2", "tvshow", "Firefly").with_year(1990),
        ];
        let retrieved = vec![MediaItem::new("new://1", "tvshow", "Firefly").with_year(2002)];

        let changeset = run(&TitleYearHandler, &ImportSettings::default(), retrieved, local);

        // The identifier moved, which is itself a change
        assert_eq!(changeset[0].kind, ChangesetKind::Changed);
        assert_eq!(changeset[1].kind, ChangesetKind::Removed);
        assert_eq!(changeset[1].item.identifier, "old://2");
    }

    #[test]
    fn test_first_match_wins_on_ambiguity() {
        let mut first = movie("a", "A");
        first.library_id = Some("1".to_string());
        let mut second = movie("a", "A");
        second.library_id = Some("2".to_string());

        let changeset = run(
            &IdentifierHandler,
            &ImportSettings::default(),
            vec![movie("a", "A")],
            vec![first, second],
        );

        assert_eq!(changeset[0].item.library_id.as_deref(), Some("1"));
        assert_eq!(changeset[1].kind, ChangesetKind::Removed);
        assert_eq!(changeset[1].item.library_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = compute_changeset(
            &IdentifierHandler,
            &ImportSettings::default(),
            vec![movie("a", "A")],
            Vec::new(),
            &cancel,
            None,
        );
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[test]
    fn test_reports_progress_per_item() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let progress: ProgressCallback = Arc::new(move |_, total| {
            assert_eq!(total, 3);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        compute_changeset(
            &IdentifierHandler,
            &ImportSettings::default(),
            vec![movie("a", "A"), movie("b", "B"), movie("c", "C")],
            Vec::new(),
            &CancellationToken::new(),
            Some(&progress),
        )
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
