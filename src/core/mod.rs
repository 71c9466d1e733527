pub mod error;
pub mod types;

pub use error::{BootstrapError, Result};
pub use types::{
    EnvironmentHandle, EnvironmentRequest, ExecutionResult, ExecutionState, Mount,
    NetworkAttachment, NetworkKind, Node, RouteEntry, StoragePaths,
};
