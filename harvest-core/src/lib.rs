#![doc = "harvest-core: core logic library for harvest."]

//! Crawling a Drive folder tree into an image table, flattening nested
//! annotation documents, shaping tables into upload-ready CSV, and publishing
//! files through the upload → register → import pipeline.
//!
//! Network access sits behind the traits in [`contract`], so everything else
//! can be tested against mocks.

pub mod auth;
pub mod batch;
pub mod config;
pub mod contract;
pub mod crawl;
pub mod drive;
pub mod error;
pub mod flatten;
pub mod publish;
pub mod record;
pub mod shape;
pub mod tabular;
pub mod transport;
