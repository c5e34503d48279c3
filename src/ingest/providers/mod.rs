pub mod feeds;
pub mod json;
