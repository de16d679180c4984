//! Viral clip engine
//!
//! Takes a public video URL and turns it into a vertical short with a burned-in
//! banner and an AI-written caption. Work is split across three stages
//! (Fetch, Transform, Caption) run by background workers; the HTTP API only
//! records jobs and reports on them.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
