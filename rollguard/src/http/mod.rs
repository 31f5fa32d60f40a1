//! HTTP client modules

pub mod client;
pub mod workflows;

pub use client::HttpClient;
pub use workflows::{CiProvider, GithubActions};
