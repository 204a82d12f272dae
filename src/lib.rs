//! AdIntel - offer tracking with ad-count trend classification.
//!
//! # Overview
//!
//! AdIntel tracks marketing offers, records periodic samples of how many ads
//! each offer is running, attaches free-text notes, and classifies each
//! offer's recent trend from its samples.
//!
//! # Modules
//!
//! - [`performance`]: Pure trend classifier over timestamped ad counts
//! - [`model`]: Offers, ad counts, notes, and API request types
//! - [`storage`]: SQLite storage layer
//! - [`portfolio`]: Offer summaries and detail views with classification
//! - [`api`]: HTTP API handlers
//! - [`config`]: Environment configuration
//! - [`error`]: Handler error type

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod performance;
pub mod portfolio;
pub mod storage;
