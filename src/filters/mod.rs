//! The record-processing core: keyword filtering, enrichment, deduplication.
//!
//! Each stage is a value transformation: it consumes a batch of records and
//! returns the records that survive, transformed. Nothing here performs
//! I/O except the deduplicator, which consults the store's existence
//! checks through the [`dedup::SeenStore`] seam.
//!
//! The pipeline applies the stages in order:
//!
//! 1. [`keyword::KeywordFilter`] — score against configured terms, drop
//!    records under the per-kind threshold
//! 2. [`enrich::ContentEnricher`] — fold extracted company names into the
//!    keyword set (news and patents)
//! 3. [`dedup::Deduplicator`] — drop records already seen in the batch or
//!    in storage

pub mod dedup;
pub mod enrich;
pub mod keyword;
