//! Application services: ingestion, media handling and report queries.

pub mod assets;
pub mod error;
pub mod ingest;
pub mod media;
pub mod notify;
pub mod reports;
pub mod repos;
