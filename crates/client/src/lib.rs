//! Client code for lantern.
//!
//! This crate provides the reqwest-backed network fetcher used by the proxy
//! server and the CLI, plus URL canonicalization for operator input.

pub mod fetch;

pub use fetch::{ByteStream, FetchConfig, HttpFetcher, StreamedResponse, is_hop_by_hop};
