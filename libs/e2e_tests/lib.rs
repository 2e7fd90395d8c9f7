pub mod sources;
pub mod streaming;
pub mod suite;
