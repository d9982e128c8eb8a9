pub mod cache;
pub mod classify;
pub mod config;
pub mod db;
pub mod decode;
pub mod engagement;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod gaps;
pub mod identity;
pub mod lms;
pub mod models;
pub mod progress;
pub mod readiness;
pub mod report;
pub mod roster;
pub mod snapshot;
pub mod sync;
