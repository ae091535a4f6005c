pub mod encoding;
pub mod query;
