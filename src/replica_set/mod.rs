pub mod initiator;
pub mod spec;

pub use initiator::{InitiationOutcome, ReplicaSetInitiator};
pub use spec::{ReplicaSetMember, ReplicaSetSpec};
