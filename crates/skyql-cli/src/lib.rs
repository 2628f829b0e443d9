//! SkyQL command line. Runs SQL-like queries against the Bluesky API.

pub mod client;
pub mod config;
pub mod interpreter;
pub mod render;
pub mod repl;
pub mod session;
pub mod types;

pub use client::XrpcClient;
pub use config::SkyqlConfig;
pub use interpreter::{QueryInterpreter, QueryOutcome, QueryReport, SearchTarget};
pub use session::BskySession;
