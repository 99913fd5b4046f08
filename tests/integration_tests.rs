//! End-to-end tests exercising the cache and storage layers together,
//! the way an application wires them up.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;

use suzaku::cache::{
    BuilderCacheManager, CacheManager, CacheOptions, MockCacheBackend, StrategyRegistry,
};
use suzaku::storage::{
    FeatureFlagManager, FileUpload, MemoryStorageBackend, SmartStorageRouter, StorageBackend,
    StorageMode,
};

fn storage_router(
    real: &MemoryStorageBackend,
    mock: &MemoryStorageBackend,
) -> SmartStorageRouter {
    SmartStorageRouter::with_backends(
        Some(Arc::new(real.clone()) as Arc<dyn StorageBackend>),
        Arc::new(mock.clone()),
        Arc::new(FeatureFlagManager::default()),
        Duration::from_secs(0),
    )
}

#[tokio::test]
async fn upload_survives_real_backend_outage() {
    let real = MemoryStorageBackend::new("real-mem", "https://cdn.example.com");
    let mock = MemoryStorageBackend::new("mock-mem", "/mock-storage");
    real.set_fail_operations(true);

    let router = storage_router(&real, &mock);
    let result = router
        .upload_file(
            FileUpload {
                file_name: "Team Photo.PNG".to_string(),
                content_type: "image/png".to_string(),
                data: Bytes::from("fake image bytes"),
            },
            Some("user-1"),
            None,
        )
        .await;

    assert!(result.success);
    assert_eq!(result.mode, StorageMode::Mock);
    assert!(router.is_fallback_active());

    let path = result.path.expect("upload result carries a path");
    assert!(path.starts_with("users/user-1/"));
    assert!(path.ends_with(".png"));
    assert_eq!(result.url, Some(format!("/mock-storage/{}", path)));
    assert!(mock.contains(&path));
    assert!(real.file_count() == 0);

    // URLs resolve against the mode that actually served the upload
    assert_eq!(router.get_file_url(&path), format!("/mock-storage/{}", path));
}

#[tokio::test]
async fn storage_recovers_when_real_backend_heals() {
    let real = MemoryStorageBackend::new("real-mem", "https://cdn.example.com");
    let mock = MemoryStorageBackend::new("mock-mem", "/mock-storage");
    let router = storage_router(&real, &mock);

    real.set_healthy(false);
    router.refresh_health().await;
    let degraded = router
        .upload_buffer(Bytes::from("x"), "a.png", "image/png")
        .await;
    assert_eq!(degraded.mode, StorageMode::Mock);

    real.set_healthy(true);
    router.refresh_health().await;
    let recovered = router
        .upload_buffer(Bytes::from("x"), "b.png", "image/png")
        .await;
    assert_eq!(recovered.mode, StorageMode::Real);
    assert!(real.contains("b.png"));
}

#[tokio::test]
async fn builder_content_round_trip_with_invalidation() {
    let backend = Arc::new(MockCacheBackend::new());
    let cache = Arc::new(
        CacheManager::new(Some(backend.clone())).with_strategies(StrategyRegistry::builtin()),
    );
    let builder = BuilderCacheManager::new(cache.clone());

    let content = json!({"title": "Landing", "body": "hello"});

    // First read misses and invokes the fetcher
    let fetched = builder
        .get_content("c1", "page", || async { Ok(content.clone()) })
        .await
        .unwrap();
    assert_eq!(fetched, content);
    assert!(backend.peek("builder:content:c1:page").is_some());

    // Second read is served from process memory, not the backend
    backend.set_fail_reads(true);
    let cached = builder
        .get_content("c1", "page", || async {
            panic!("fetcher must not run on a memory hit")
        })
        .await
        .unwrap();
    assert_eq!(cached, content);
    backend.set_fail_reads(false);

    builder.invalidate_content("c1", "page").await;
    assert_eq!(builder.memory_len(), 0);
    assert!(backend.peek("builder:content:c1:page").is_none());

    // After invalidation the fetcher runs again
    let refetched = builder
        .get_content("c1", "page", || async { Ok(json!({"title": "v2"})) })
        .await
        .unwrap();
    assert_eq!(refetched, json!({"title": "v2"}));
}

#[tokio::test]
async fn tag_invalidation_clears_grouped_keys() {
    let backend = Arc::new(MockCacheBackend::new());
    let cache = CacheManager::new(Some(backend.clone()));

    for id in ["a", "b"] {
        let key = format!("cache:article:{}", id);
        cache
            .get_or_set(
                &key,
                || async { Ok(json!({"id": id})) },
                CacheOptions::default().tagged(vec!["articles".to_string()]),
            )
            .await
            .unwrap();
    }
    cache
        .get_or_set(
            "cache:page:home",
            || async { Ok(json!({"page": "home"})) },
            CacheOptions::default().tagged(vec!["pages".to_string()]),
        )
        .await
        .unwrap();

    let removed = cache.invalidate_by_tags(&["articles".to_string()]).await;
    assert_eq!(removed, 2);
    assert!(backend.peek("cache:article:a").is_none());
    assert!(backend.peek("cache:article:b").is_none());
    assert!(backend.peek("cache:page:home").is_some());
}
