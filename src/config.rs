use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::ResourceClass;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Backend API base URL (including the `/api` prefix)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Local server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Local server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout applied to every backend call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for the recommendation retraining call
    #[serde(default = "default_training_timeout_ms")]
    pub training_timeout_ms: u64,

    #[serde(default = "default_watchlist_interval_ms")]
    pub watchlist_min_interval_ms: u64,

    #[serde(default = "default_likes_interval_ms")]
    pub likes_min_interval_ms: u64,

    #[serde(default = "default_stats_interval_ms")]
    pub stats_min_interval_ms: u64,

    #[serde(default = "default_recommendations_interval_ms")]
    pub recommendations_min_interval_ms: u64,

    #[serde(default = "default_comments_interval_ms")]
    pub comments_min_interval_ms: u64,

    #[serde(default = "default_notifications_interval_ms")]
    pub notifications_min_interval_ms: u64,

    /// Extra delay pushed onto a resource class after a rate-limited reply
    #[serde(default = "default_rate_limit_penalty_ms")]
    pub rate_limit_penalty_ms: u64,

    /// Unforced stats reads inside this window are dropped
    #[serde(default = "default_stats_debounce_ms")]
    pub stats_debounce_ms: u64,

    /// Unforced notification list reads inside this window are dropped
    #[serde(default = "default_notifications_debounce_ms")]
    pub notifications_debounce_ms: u64,

    /// Unforced comment-thread reads inside this window are dropped
    #[serde(default = "default_comments_debounce_ms")]
    pub comments_debounce_ms: u64,

    /// Period of the unread-notification counter poll
    #[serde(default = "default_unread_poll_interval_ms")]
    pub unread_poll_interval_ms: u64,

    /// Identity signals inside this window of the last verification are dropped
    #[serde(default = "default_verify_debounce_ms")]
    pub verify_debounce_ms: u64,

    #[serde(default = "default_bootstrap_likes_delay_ms")]
    pub bootstrap_likes_delay_ms: u64,

    #[serde(default = "default_bootstrap_stats_delay_ms")]
    pub bootstrap_stats_delay_ms: u64,

    /// Delay before the first unread-notification read of a session
    #[serde(default = "default_bootstrap_notifications_delay_ms")]
    pub bootstrap_notifications_delay_ms: u64,

    /// Pause between confirmed identity and the staged bootstrap
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Pause between obtaining an identity token and verifying it
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,

    #[serde(default = "default_login_settle_ms")]
    pub login_settle_ms: u64,

    #[serde(default = "default_confirm_refresh_delay_ms")]
    pub confirm_refresh_delay_ms: u64,

    #[serde(default = "default_stats_refresh_delay_ms")]
    pub stats_refresh_delay_ms: u64,

    #[serde(default = "default_comment_stats_delay_ms")]
    pub comment_stats_delay_ms: u64,

    #[serde(default = "default_recommendation_ttl_ms")]
    pub recommendation_ttl_ms: u64,

    /// Delay before checking for an existing backend session
    #[serde(default = "default_session_check_delay_ms")]
    pub session_check_delay_ms: u64,
}

fn default_api_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_training_timeout_ms() -> u64 {
    60_000
}

fn default_watchlist_interval_ms() -> u64 {
    5_000
}

fn default_likes_interval_ms() -> u64 {
    5_000
}

fn default_stats_interval_ms() -> u64 {
    2_000
}

fn default_recommendations_interval_ms() -> u64 {
    5_000
}

fn default_comments_interval_ms() -> u64 {
    3_000
}

fn default_notifications_interval_ms() -> u64 {
    2_000
}

fn default_notifications_debounce_ms() -> u64 {
    30_000
}

fn default_comments_debounce_ms() -> u64 {
    2_000
}

fn default_unread_poll_interval_ms() -> u64 {
    120_000
}

fn default_rate_limit_penalty_ms() -> u64 {
    10_000
}

fn default_stats_debounce_ms() -> u64 {
    2_000
}

fn default_verify_debounce_ms() -> u64 {
    10_000
}

fn default_bootstrap_likes_delay_ms() -> u64 {
    8_000
}

fn default_bootstrap_stats_delay_ms() -> u64 {
    15_000
}

fn default_bootstrap_notifications_delay_ms() -> u64 {
    20_000
}

fn default_settle_delay_ms() -> u64 {
    5_000
}

fn default_verify_delay_ms() -> u64 {
    3_000
}

fn default_login_settle_ms() -> u64 {
    3_000
}

fn default_confirm_refresh_delay_ms() -> u64 {
    10_000
}

fn default_stats_refresh_delay_ms() -> u64 {
    15_000
}

fn default_comment_stats_delay_ms() -> u64 {
    10_000
}

fn default_recommendation_ttl_ms() -> u64 {
    300_000
}

fn default_session_check_delay_ms() -> u64 {
    5_000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Origin of the backend server, used to resolve relative upload paths
    pub fn server_origin(&self) -> String {
        let trimmed = self.api_url.trim_end_matches('/');
        trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string()
    }

    /// Timing knobs for the sync engine
    pub fn sync_settings(&self) -> SyncSettings {
        let ms = Duration::from_millis;

        let min_intervals = HashMap::from([
            (ResourceClass::Watchlist, ms(self.watchlist_min_interval_ms)),
            (ResourceClass::Likes, ms(self.likes_min_interval_ms)),
            (ResourceClass::Stats, ms(self.stats_min_interval_ms)),
            (ResourceClass::Recommendations, ms(self.recommendations_min_interval_ms)),
            (ResourceClass::Comments, ms(self.comments_min_interval_ms)),
            (ResourceClass::Notifications, ms(self.notifications_min_interval_ms)),
        ]);

        let debounce_windows = HashMap::from([
            (ResourceClass::Stats, ms(self.stats_debounce_ms)),
            (ResourceClass::Notifications, ms(self.notifications_debounce_ms)),
            (ResourceClass::Comments, ms(self.comments_debounce_ms)),
            (ResourceClass::Session, ms(self.verify_debounce_ms)),
        ]);

        SyncSettings {
            min_intervals,
            debounce_windows,
            rate_limit_penalty: ms(self.rate_limit_penalty_ms),
            request_timeout: ms(self.request_timeout_ms),
            training_timeout: ms(self.training_timeout_ms),
            bootstrap_likes_delay: ms(self.bootstrap_likes_delay_ms),
            bootstrap_stats_delay: ms(self.bootstrap_stats_delay_ms),
            bootstrap_notifications_delay: ms(self.bootstrap_notifications_delay_ms),
            settle_delay: ms(self.settle_delay_ms),
            verify_delay: ms(self.verify_delay_ms),
            login_settle: ms(self.login_settle_ms),
            confirm_refresh_delay: ms(self.confirm_refresh_delay_ms),
            stats_refresh_delay: ms(self.stats_refresh_delay_ms),
            comment_stats_delay: ms(self.comment_stats_delay_ms),
            recommendation_ttl: ms(self.recommendation_ttl_ms),
            session_check_delay: ms(self.session_check_delay_ms),
            unread_poll_interval: ms(self.unread_poll_interval_ms),
            server_origin: self.server_origin(),
        }
    }
}

/// Tunable timing for backoff, debouncing and staged scheduling
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub min_intervals: HashMap<ResourceClass, Duration>,
    pub debounce_windows: HashMap<ResourceClass, Duration>,
    pub rate_limit_penalty: Duration,
    pub request_timeout: Duration,
    pub training_timeout: Duration,
    pub bootstrap_likes_delay: Duration,
    pub bootstrap_stats_delay: Duration,
    pub bootstrap_notifications_delay: Duration,
    pub settle_delay: Duration,
    pub verify_delay: Duration,
    pub login_settle: Duration,
    pub confirm_refresh_delay: Duration,
    pub stats_refresh_delay: Duration,
    pub comment_stats_delay: Duration,
    pub recommendation_ttl: Duration,
    pub session_check_delay: Duration,
    pub unread_poll_interval: Duration,
    pub server_origin: String,
}

impl SyncSettings {
    /// Minimum spacing between two calls of the same resource class
    pub fn min_interval(&self, class: ResourceClass) -> Duration {
        self.min_intervals
            .get(&class)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Window inside which an unforced repeat request is dropped
    pub fn debounce_window(&self, class: ResourceClass) -> Option<Duration> {
        self.debounce_windows
            .get(&class)
            .copied()
            .filter(|window| !window.is_zero())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Config {
            api_url: default_api_url(),
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            training_timeout_ms: default_training_timeout_ms(),
            watchlist_min_interval_ms: default_watchlist_interval_ms(),
            likes_min_interval_ms: default_likes_interval_ms(),
            stats_min_interval_ms: default_stats_interval_ms(),
            recommendations_min_interval_ms: default_recommendations_interval_ms(),
            comments_min_interval_ms: default_comments_interval_ms(),
            notifications_min_interval_ms: default_notifications_interval_ms(),
            rate_limit_penalty_ms: default_rate_limit_penalty_ms(),
            stats_debounce_ms: default_stats_debounce_ms(),
            notifications_debounce_ms: default_notifications_debounce_ms(),
            comments_debounce_ms: default_comments_debounce_ms(),
            unread_poll_interval_ms: default_unread_poll_interval_ms(),
            verify_debounce_ms: default_verify_debounce_ms(),
            bootstrap_likes_delay_ms: default_bootstrap_likes_delay_ms(),
            bootstrap_stats_delay_ms: default_bootstrap_stats_delay_ms(),
            bootstrap_notifications_delay_ms: default_bootstrap_notifications_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            verify_delay_ms: default_verify_delay_ms(),
            login_settle_ms: default_login_settle_ms(),
            confirm_refresh_delay_ms: default_confirm_refresh_delay_ms(),
            stats_refresh_delay_ms: default_stats_refresh_delay_ms(),
            comment_stats_delay_ms: default_comment_stats_delay_ms(),
            recommendation_ttl_ms: default_recommendation_ttl_ms(),
            session_check_delay_ms: default_session_check_delay_ms(),
        }
        .sync_settings()
    }
}
