//! Ingestion and geospatial query service for citizen-submitted incident reports.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
