//! Engagement and cache core for a social movie & series rating feed.
//!
//! Headless by design: consumers bind [`engagement::PostEngagementController`]
//! state to their view layer, persist through [`cache::CacheStore`], and
//! plug in their own backends via the [`engagement::EngagementStore`],
//! [`catalog::TitleFetcher`], [`cache::KvStorage`], and [`auth::AuthContext`]
//! seams.

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod engagement;
pub mod logging;
pub mod rating;

pub use config::Config;
