//! Scrape YouTube channels, videos and comments for a roster of Spotify artists.
//!
//! The crate is organised around one generic acquisition loop
//! ([`orchestrator::run`]) parameterised by a [`orchestrator::Pipeline`]:
//!
//! - [`browser`]: the `Page`/`Node` abstraction, the headless Chrome driver and
//!   the scroll poller
//! - [`scrapers`]: per-content extraction and the pipelines built on it
//! - [`retry`]: bounded retries around one acquisition
//! - [`reconcile`]: set difference of scraped records against stored ones
//! - [`store`]: SQLite persistence with one transaction per commit
//! - [`import`]: seeding artists from CSV

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;
pub mod scrapers;
pub mod store;
pub mod utils;
