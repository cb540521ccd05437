use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    error::SyncResult,
    models::{Movie, ResourceClass, UserId},
    services::{context::SyncContext, store::ResourceLoading},
};

struct CacheEntry {
    result: Arc<Vec<Movie>>,
    fetched_at: Instant,
}

/// Most recent personalized recommendations per user, valid for a fixed TTL
pub struct RecommendationCache {
    entries: Mutex<HashMap<UserId, CacheEntry>>,
    ttl: Duration,
}

impl RecommendationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached result for `user_id`, unless it is older than the TTL
    pub fn get(&self, user_id: UserId) -> Option<Arc<Vec<Movie>>> {
        let entries = self.lock();
        let entry = entries.get(&user_id)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.result))
        } else {
            None
        }
    }

    pub fn set(&self, user_id: UserId, result: Vec<Movie>) -> Arc<Vec<Movie>> {
        let result = Arc::new(result);
        self.lock().insert(
            user_id,
            CacheEntry {
                result: Arc::clone(&result),
                fetched_at: Instant::now(),
            },
        );
        result
    }

    pub fn invalidate(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Generates personalized watch recommendations
///
/// Serves from the TTL cache when possible. At most one backend request is in
/// flight at a time; a caller arriving while one runs gets an empty list and
/// should try again later.
#[derive(Clone)]
pub struct RecommendationService {
    ctx: Arc<SyncContext>,
}

impl RecommendationService {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    pub async fn recommended_movies(&self, limit: usize) -> SyncResult<Arc<Vec<Movie>>> {
        let (session, user_id) = match self.ctx.active_user().await {
            Ok(active) => active,
            Err(_) => {
                tracing::debug!("No user signed in, no recommendations");
                return Ok(Arc::new(Vec::new()));
            }
        };

        if let Some(cached) = self.ctx.recommendations.get(user_id) {
            tracing::debug!(user_id = %user_id, count = cached.len(), "Serving cached recommendations");
            return Ok(cached);
        }

        let _guard = match self.ctx.flights.try_enter(ResourceClass::Recommendations) {
            Some(guard) => guard,
            None => {
                tracing::debug!("Recommendations already being fetched");
                return Ok(Arc::new(Vec::new()));
            }
        };

        self.ctx
            .store
            .set_loading(session, ResourceLoading::Recommendations, true)
            .await;
        self.ctx.throttle(ResourceClass::Recommendations).await;

        tracing::info!(user_id = %user_id, limit, "Fetching recommendations");
        let backend = Arc::clone(&self.ctx.backend);
        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                backend.get_recommendations(user_id, limit),
            )
            .await;
        self.ctx
            .store
            .set_loading(session, ResourceLoading::Recommendations, false)
            .await;

        match result {
            Ok(movies) => {
                if self.ctx.store.is_current(session).await {
                    Ok(self.ctx.recommendations.set(user_id, movies))
                } else {
                    Ok(Arc::new(movies))
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch recommendations");
                self.ctx
                    .handle_failure(session, ResourceClass::Recommendations, &e)
                    .await;
                Err(e)
            }
        }
    }

    /// Asks the backend to retrain and drops every cached result
    pub async fn train_models(&self) -> SyncResult<()> {
        tracing::info!("Training recommendation models");
        let backend = Arc::clone(&self.ctx.backend);
        let result = self
            .ctx
            .call(self.ctx.settings.training_timeout, backend.train_recommendations())
            .await;

        match result {
            Ok(()) => {
                self.ctx.recommendations.invalidate();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recommendation training failed");
                if let Some(session) = self.ctx.store.current_session().await {
                    self.ctx
                        .handle_failure(session, ResourceClass::Recommendations, &e)
                        .await;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::models::MovieId;
    use crate::services::backend::MockBackend;
    use crate::services::test_support::{context, sign_in, USER};

    fn movies() -> Vec<Movie> {
        vec![Movie::new(MovieId(1), "Arrival"), Movie::new(MovieId(2), "Sicario")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let cache = RecommendationCache::new(Duration::from_millis(300_000));
        cache.set(USER, movies());

        tokio::time::advance(Duration::from_millis(299_999)).await;
        assert!(cache.get(USER).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(USER).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_invalidate() {
        let cache = RecommendationCache::new(Duration::from_secs(300));
        cache.set(USER, movies());
        cache.invalidate();
        assert!(cache.get(USER).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_ttl_returns_same_object() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_recommendations()
            .times(1)
            .returning(|_, _| Ok(movies()));

        let ctx = context(backend);
        sign_in(&ctx).await;
        let service = RecommendationService::new(ctx);

        let first = service.recommended_movies(10).await.unwrap();
        let second = service.recommended_movies(10).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_during_fetch_gets_empty_result() {
        let mut backend = MockBackend::new();
        backend.expect_get_recommendations().never();

        let ctx = context(backend);
        sign_in(&ctx).await;
        let service = RecommendationService::new(ctx.clone());

        let _guard = ctx.flights.try_enter(ResourceClass::Recommendations).unwrap();
        let result = service.recommended_movies(10).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_out_returns_empty() {
        let ctx = context(MockBackend::new());
        let service = RecommendationService::new(ctx);
        assert!(service.recommended_movies(5).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_invalidates_cache() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_recommendations()
            .times(2)
            .returning(|_, _| Ok(movies()));
        backend.expect_train_recommendations().times(1).returning(|| Ok(()));

        let ctx = context(backend);
        sign_in(&ctx).await;
        let service = RecommendationService::new(ctx);

        let first = service.recommended_movies(10).await.unwrap();
        service.train_models().await.unwrap();
        let second = service.recommended_movies(10).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let mut backend = MockBackend::new();
        let mut calls = 0;
        backend.expect_get_recommendations().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(SyncError::NetworkTimeout)
            } else {
                Ok(movies())
            }
        });

        let ctx = context(backend);
        sign_in(&ctx).await;
        let service = RecommendationService::new(ctx.clone());

        assert_eq!(
            service.recommended_movies(10).await.unwrap_err(),
            SyncError::NetworkTimeout
        );
        assert!(!ctx.flights.is_in_flight(ResourceClass::Recommendations));
        assert_eq!(service.recommended_movies(10).await.unwrap().len(), 2);
    }
}
