//! casewatch - fraud-case summary extraction and search.
//!
//! Fetches case-summary pages, pulls records out of them with an ordered
//! cascade of extraction strategies, tags them against a keyword vocabulary
//! and upserts them into a deduplicated document store.

pub mod cli;
pub mod config;
pub mod extraction;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod scrapers;
pub mod services;
pub mod storage;
