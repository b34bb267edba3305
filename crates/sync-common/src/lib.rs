pub mod canvas;
pub mod error;
pub mod http;
pub mod notion;
pub mod throttle;

pub use reqwest::StatusCode;
