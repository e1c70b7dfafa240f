pub mod ingest;
pub mod output;
