pub mod error;
pub mod rest;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StoreError;
pub use rest::{Method, RestRequest, RestResponse, RestStore, Transport};
pub use sqlite::{LoggedRequest, SqliteBackend};
pub use traits::*;
