//! Fantia archiver library.
//!
//! An incremental synchronization engine for fantia.jp: walks a creator's
//! posts through the linked-list pagination of the post API, decomposes each
//! post into normalized local posts and files, and downloads any binaries
//! that are not already present. Subscriptions persist a head/tail cursor so
//! repeated runs resume where they left off instead of re-fetching.

pub mod api;
pub mod config;
pub mod constants;
pub mod db;
pub mod normalizer;
pub mod paginator;
pub mod session;
pub mod source;
pub mod store;
