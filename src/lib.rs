//! Newsletter Digest - personalized digests from subscribed feeds
//!
//! This crate selects a handful of feed sources matching a reader's interests,
//! fetches and cleans their articles through an RSS-to-JSON converter, prunes
//! sources that no longer produce content, and writes a digest either through
//! a chat-completions endpoint or a fixed template.

pub mod completion;
pub mod composer;
pub mod config;
pub mod converter;
pub mod db;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod pruner;
pub mod routes;
pub mod selection;
