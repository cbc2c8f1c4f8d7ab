pub mod ingestion;
pub mod normalize;
