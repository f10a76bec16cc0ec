// src/ingest/providers/mod.rs
pub mod company_site;
pub mod media_rss;
pub mod press_release;
pub mod rss;
pub mod social_rss;
