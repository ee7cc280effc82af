pub mod client;
pub mod ranker;
