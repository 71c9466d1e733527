use crate::command::CommandLine;
use crate::core::{
    BootstrapError, EnvironmentHandle, EnvironmentRequest, ExecutionResult, Result, RouteEntry,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

// Collaborator seams and the in-memory implementation live in separate files.
include!("backend/traits.rs");
include!("backend/in_memory.rs");
