//! # Feed Module
//!
//! Reading the upstream RSS feed and writing the republished one.
//!
//! - [`parse_feed`] turns the upstream document into [`Episode`]s in feed order
//! - [`Fetcher`] retrieves the document and episode audio
//! - [`FeedRewriter`] emits the new document with enclosures pointing at
//!   local artifacts

pub mod fetcher;
pub mod parser;
pub mod rewriter;
pub mod types;

pub use fetcher::{Fetcher, HttpFetcher};
pub use parser::parse_feed;
pub use rewriter::{format_pub_date, FeedDocument, FeedRewriter, PublicLocator};
pub use types::{file_name_from_url, ChannelInfo, Episode, EpisodeGuid, SourceFeed, TypedLink};
