//! Markup scrapers for the news source.
//!
//! | Page | Module | Method |
//! |------|--------|--------|
//! | News listing | [`listing`] | HTML link scan with a title heuristic cascade |
//!
//! Scrapers are pure: they take markup and a base URL and never fail on
//! unexpected structure. Fetching lives in [`crate::fetch`].

pub mod listing;

pub use listing::ListingExtractor;
