//! HTTP API handlers for exintel-server

pub mod auth;
pub mod classify;
pub mod cron;
pub mod exchanges;
pub mod features;
pub mod health;
pub mod matrix;
pub mod screenshots;
pub mod stats;
pub mod suggestions;

pub use classify::classify_routes;
pub use cron::cron_routes;
pub use exchanges::exchange_routes;
pub use features::feature_routes;
pub use health::health_routes;
pub use matrix::matrix_routes;
pub use screenshots::screenshot_routes;
pub use stats::stats_routes;
pub use suggestions::suggestion_routes;
