pub mod cancel;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod http_client;
pub mod local;
pub mod types;
pub mod utils;
