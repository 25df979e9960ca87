pub mod domain;
pub mod importer;
pub mod ports;
pub mod repository;
pub mod testing;
pub mod views;

pub use domain::{
    ImportReport, Item, ItemFilter, ItemStatus, RawRecord, SkippedRecord, SortKey, User,
    UserCredentials,
};
pub use importer::{BatchImporter, ImportError};
pub use ports::{
    AuthService, DocumentStore, FixedIdentity, IdentityProvider, PortError, PortResult,
    SheetParser, StoreBatch, VersionedDoc, MAX_BATCH_OPS,
};
pub use repository::ItemRepository;
