//! Session management for the Bluesky API.

pub mod manager;

pub use manager::{jwt_expiry, AuthTokens, BskySession, Fetched, Page, PostSearch};
