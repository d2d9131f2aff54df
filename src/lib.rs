//! 9Anime Resolver Library
//!
//! Catalog browsing and stream resolution for 9anime: VRF token signing
//! through an embedded script sandbox, declarative HTML extraction, mirror
//! host interception and HLS manifest normalization, exposed through the
//! `NineAnime` provider and a set of REST endpoints.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod fanout;
pub mod interceptor;
pub mod models;
pub mod parser;
pub mod provider;
pub mod routes;
pub mod sandbox;
pub mod scraper;
pub mod stream;
pub mod token;

#[cfg(test)]
mod testing;
