pub mod app;
pub mod db;
pub mod migrate;
const VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVICE: &str = "tidemark";
