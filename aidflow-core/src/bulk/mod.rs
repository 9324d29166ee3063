pub mod executor;
pub mod export;
pub mod manager;
pub mod registry;
pub mod store;
pub mod types;
pub mod validator;

pub use executor::{EntityExecutor, EntityRequest};
pub use manager::BulkOperationManager;
pub use registry::EntityActionRegistry;
pub use store::{InMemoryOperationStore, OperationStore};
pub use types::{
    BulkAction, BulkOperation, BulkOperationError, BulkProgress, EntityType, ExportFile,
    OperationStatus,
};
pub use validator::{BulkOperationValidator, ValidationReport};
