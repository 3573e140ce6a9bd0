pub mod config;
pub mod query;
pub mod response;

pub use config::*;
pub use query::*;
pub use response::*;
