mod sqlite;
mod tables;

pub use sqlite::Database;
pub use tables::ProfileUpdate;
pub(crate) use sqlite::{parse_optional_timestamp, parse_timestamp};
