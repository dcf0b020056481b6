//! Persistence fan-out across several repositories


use async_trait::async_trait;
use lumen_core::{media_types, Import, ImportRepository, LumenError, MediaType, Source};
use lumen_storage::MemoryRepository;
use lumen_sync::{SourceRegistry, SyncError};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::init_tracing;

mock! {
    pub Repository {}

    #[async_trait]
    impl ImportRepository for Repository {
        async fn get_sources(&self) -> lumen_core::Result<Vec<Source>>;
        async fn get_source(&self, identifier: &str) -> lumen_core::Result<Option<Source>>;
        async fn add_source(&self, source: &Source) -> lumen_core::Result<()>;
        async fn update_source(&self, source: &Source) -> lumen_core::Result<()>;
        async fn remove_source(&self, identifier: &str) -> lumen_core::Result<()>;
        async fn get_imports(&self) -> lumen_core::Result<Vec<Import>>;
        async fn get_import(&self, path: &str, media_type: &MediaType) -> lumen_core::Result<Option<Import>>;
        async fn add_import(&self, import: &Import) -> lumen_core::Result<()>;
        async fn update_import(&self, import: &Import) -> lumen_core::Result<()>;
        async fn remove_import(&self, path: &str, media_type: &MediaType) -> lumen_core::Result<()>;
        async fn update_last_sync(&self, import: &Import) -> lumen_core::Result<()>;
    }
}

/// A repository that loads nothing and rejects every write
fn failing_repository() -> MockRepository {
    let mut repository = MockRepository::new();
    repository.expect_get_sources().returning(|| Ok(Vec::new()));
    repository.expect_get_imports().returning(|| Ok(Vec::new()));
    repository
        .expect_add_source()
        .returning(|_| Err(LumenError::storage("disk full")));
    repository
        .expect_add_import()
        .returning(|_| Err(LumenError::storage("disk full")));
    repository
        .expect_remove_source()
        .returning(|_| Err(LumenError::storage("disk full")));
    repository
}

/// An in-memory repository whose adds take a database round-trip
#[derive(Default)]
struct SlowRepository {
    inner: MemoryRepository,
}

impl SlowRepository {
    async fn round_trip() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[async_trait]
impl ImportRepository for SlowRepository {
    async fn get_sources(&self) -> lumen_core::Result<Vec<Source>> {
        self.inner.get_sources().await
    }

    async fn get_source(&self, identifier: &str) -> lumen_core::Result<Option<Source>> {
        self.inner.get_source(identifier).await
    }

    async fn add_source(&self, source: &Source) -> lumen_core::Result<()> {
        Self::round_trip().await;
        self.inner.add_source(source).await
    }

    async fn update_source(&self, source: &Source) -> lumen_core::Result<()> {
        self.inner.update_source(source).await
    }

    async fn remove_source(&self, identifier: &str) -> lumen_core::Result<()> {
        self.inner.remove_source(identifier).await
    }

    async fn get_imports(&self) -> lumen_core::Result<Vec<Import>> {
        self.inner.get_imports().await
    }

    async fn get_import(&self, path: &str, media_type: &MediaType) -> lumen_core::Result<Option<Import>> {
        self.inner.get_import(path, media_type).await
    }

    async fn add_import(&self, import: &Import) -> lumen_core::Result<()> {
        Self::round_trip().await;
        self.inner.add_import(import).await
    }

    async fn update_import(&self, import: &Import) -> lumen_core::Result<()> {
        self.inner.update_import(import).await
    }

    async fn remove_import(&self, path: &str, media_type: &MediaType) -> lumen_core::Result<()> {
        self.inner.remove_import(path, media_type).await
    }

    async fn update_last_sync(&self, import: &Import) -> lumen_core::Result<()> {
        self.inner.update_last_sync(import).await
    }
}

fn source() -> Source {
    Source::new("mock://nas", "NAS")
        .with_media_types([MediaType::new(media_types::MOVIE)])
        .with_active(true)
}

#[tokio::test]
async fn test_one_accepting_repository_is_enough() {
    init_tracing();
    let memory = Arc::new(MemoryRepository::new());
    let registry = SourceRegistry::new(vec![Arc::new(failing_repository()), memory.clone()]);

    registry.add_source(&source()).await.unwrap();
    let import = Import::new("mock://nas", media_types::MOVIE, source());
    assert!(registry.add_import(&import).await.unwrap());

    assert!(registry.has_source("mock://nas").await);
    assert_eq!(memory.get_sources().await.unwrap().len(), 1);
    assert_eq!(memory.get_imports().await.unwrap().len(), 1);

    registry.remove_source("mock://nas").await.unwrap();
    assert!(memory.get_sources().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_repositories_failing_is_reported() {
    init_tracing();
    let registry = SourceRegistry::new(vec![
        Arc::new(failing_repository()),
        Arc::new(failing_repository()),
    ]);

    let err = registry.add_source(&source()).await.unwrap_err();
    assert!(matches!(err, SyncError::Persistence(_)));
    assert!(!err.is_configuration());
    assert!(!registry.has_source("mock://nas").await);
}

#[tokio::test]
async fn test_load_failure_in_one_repository_keeps_the_others() {
    init_tracing();
    let memory = Arc::new(MemoryRepository::new());
    memory.add_source(&source()).await.unwrap();

    let mut broken = MockRepository::new();
    broken
        .expect_get_sources()
        .returning(|| Err(LumenError::storage("corrupt")));
    broken
        .expect_get_imports()
        .returning(|| Err(LumenError::storage("corrupt")));

    let registry = SourceRegistry::new(vec![Arc::new(broken), memory]);
    let sources = registry.get_sources(None).await;
    assert_eq!(sources.len(), 1);
    assert!(!sources[0].active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_duplicate_adds_are_no_ops() {
    init_tracing();
    let repository = Arc::new(SlowRepository::default());
    let registry = Arc::new(SourceRegistry::new(vec![repository.clone()]));

    let adds: Vec<_> = (0..2)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.add_source(&source()).await })
        })
        .collect();
    for add in adds {
        add.await.unwrap().unwrap();
    }
    assert_eq!(repository.inner.get_sources().await.unwrap().len(), 1);

    let adds: Vec<_> = (0..2)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let import = Import::new("mock://nas/x", media_types::MOVIE, source());
                registry.add_import(&import).await
            })
        })
        .collect();
    let mut added = Vec::new();
    for add in adds {
        added.push(add.await.unwrap().unwrap());
    }

    assert_eq!(added.iter().filter(|added| **added).count(), 1);
    assert_eq!(registry.get_imports().await.len(), 1);
    assert_eq!(repository.inner.get_imports().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_add_can_be_retried() {
    init_tracing();
    let memory = Arc::new(MemoryRepository::new());
    let registry = SourceRegistry::new(vec![memory.clone()]);

    // The source is unknown to the repository, so the import is rejected
    let import = Import::new("mock://nas/x", media_types::MOVIE, source());
    assert!(matches!(
        registry.add_import(&import).await,
        Err(SyncError::Persistence(_))
    ));

    registry.add_source(&source()).await.unwrap();
    assert!(registry.add_import(&import).await.unwrap());
}
