//! Change detection and the reconciliation loop for Herald.
//!
//! This crate turns polled Roblox game state into Discord announcements.
//! It owns the policy (what counts as a milestone, a new place, an update)
//! and the driver; the HTTP clients live in the announcer binary behind
//! the [`GameDataSource`] and [`Notifier`] traits.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `herald.yaml` plus environment
//!   overrides, validated into [`ServiceSettings`].
//! - [`detect`] -- Milestone, new-place and update detectors.
//! - [`message`] -- Announcement text rendering.
//! - [`notify`] -- [`Notifier`] trait for the chat side.
//! - [`source`] -- [`GameDataSource`] trait for the catalog side.
//! - [`service`] -- [`ReconciliationService`], the per-tick driver.
//! - [`ticker`] -- Interval and manual tick sources.
//!
//! [`GameDataSource`]: source::GameDataSource
//! [`Notifier`]: notify::Notifier
//! [`ServiceSettings`]: config::ServiceSettings
//! [`ReconciliationService`]: service::ReconciliationService

pub mod config;
pub mod detect;
pub mod message;
pub mod notify;
pub mod service;
pub mod source;
pub mod ticker;

pub use config::{ConfigError, HeraldConfig, MessageStyle, MilestoneFrequency, ServiceSettings};
pub use detect::Announcement;
pub use notify::{DispatchError, Notifier};
pub use service::{GameOutcome, PassReport, ReconciliationService, ServiceError, ServiceHandle};
pub use source::{FetchError, GameDataSource};
pub use ticker::{IntervalTicker, ManualTicker, TickTrigger, Ticker};
