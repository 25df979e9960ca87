pub mod auth;
pub mod sheet;
pub mod store;

pub use auth::StoreAuth;
pub use sheet::TabularFileParser;
pub use store::PgDocumentStore;
