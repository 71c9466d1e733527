/// Host-side operations of the provisioning backend.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Returns the host routing table.
    async fn route_list(&self) -> Result<Vec<RouteEntry>>;

    /// Finds or creates a named volume in a storage pool and returns its host path.
    async fn ensure_volume(&self, pool: &str, name: &str) -> Result<PathBuf>;

    /// Creates a directory on the host; existing directories are not an error.
    async fn make_host_directory(&self, path: &Path) -> Result<()>;

    /// Finds or creates the environment described by `request`.
    ///
    /// Must be idempotent on `request.name`.
    async fn provision_environment(&self, request: &EnvironmentRequest)
    -> Result<EnvironmentHandle>;

    /// Installs and starts the environment, returning once it has completed.
    async fn install_environment(&self, handle: &EnvironmentHandle) -> Result<()>;

    /// Returns the assigned address, or `None` while none has been assigned.
    async fn resolve_address(&self, handle: &EnvironmentHandle) -> Result<Option<IpAddr>>;
}

/// Operations executed inside a provisioned environment.
#[async_trait]
pub trait NodeShell: Send + Sync {
    async fn make_directory(&self, handle: &EnvironmentHandle, path: &str) -> Result<()>;

    /// Removes a file; a missing file is not an error.
    async fn remove_file(&self, handle: &EnvironmentHandle, path: &str) -> Result<()>;

    async fn write_file(&self, handle: &EnvironmentHandle, path: &str, content: &str)
    -> Result<()>;

    /// Runs a command to completion.
    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        command: &CommandLine,
    ) -> Result<ExecutionResult>;

    /// Starts a command in the background. The result only acknowledges the start.
    async fn spawn(
        &self,
        handle: &EnvironmentHandle,
        command: &CommandLine,
    ) -> Result<ExecutionResult>;
}
