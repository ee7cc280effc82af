pub mod engine;
pub mod filter;
pub mod merge;
pub mod normalize;
pub mod query;
pub mod rank;
