/// A call observed by [`InMemoryBackend`], in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum BackendCall {
    RouteList,
    EnsureVolume { pool: String, name: String },
    MakeHostDirectory { path: PathBuf },
    ProvisionEnvironment { name: String, reused: bool },
    InstallEnvironment { name: String },
    ResolveAddress { name: String, resolved: Option<IpAddr> },
    MakeDirectory { name: String, path: String },
    RemoveFile { name: String, path: String },
    WriteFile { name: String, path: String },
    Execute { name: String, command: String },
    Spawn { name: String, command: String },
}

/// How a simulated environment obtains its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressPlan {
    /// Number of lookups that still report "not assigned".
    After(u32),
    Never,
}

struct InMemoryEnvironment {
    handle: EnvironmentHandle,
    request: EnvironmentRequest,
    installed: bool,
    address: IpAddr,
    directories: BTreeSet<String>,
    files: BTreeMap<String, String>,
    spawned: Vec<String>,
    executed: Vec<String>,
}

struct InMemoryState {
    routes: Vec<RouteEntry>,
    volumes: BTreeMap<(String, String), PathBuf>,
    host_directories: BTreeSet<PathBuf>,
    environments: BTreeMap<String, InMemoryEnvironment>,
    address_plans: HashMap<String, AddressPlan>,
    default_address_delay: u32,
    address_lookup_failures: HashMap<String, String>,
    provisioning_failures: HashMap<String, String>,
    execution_results: VecDeque<ExecutionResult>,
    spawn_results: VecDeque<ExecutionResult>,
    next_host_octet: u8,
    calls: Vec<BackendCall>,
}

impl Default for InMemoryState {
    fn default() -> Self {
        Self {
            routes: vec![
                RouteEntry::with_gateway("eth0", "192.168.122.1"),
                RouteEntry::new("zos0"),
            ],
            volumes: BTreeMap::new(),
            host_directories: BTreeSet::new(),
            environments: BTreeMap::new(),
            address_plans: HashMap::new(),
            default_address_delay: 0,
            address_lookup_failures: HashMap::new(),
            provisioning_failures: HashMap::new(),
            execution_results: VecDeque::new(),
            spawn_results: VecDeque::new(),
            next_host_octet: 2,
            calls: Vec::new(),
        }
    }
}

impl InMemoryState {
    fn environment_mut(&mut self, handle: &EnvironmentHandle) -> Result<&mut InMemoryEnvironment> {
        self.environments.get_mut(&handle.name).ok_or_else(|| {
            BootstrapError::InvalidState(format!(
                "environment '{}' does not exist",
                handle.name
            ))
        })
    }
}

/// An in-memory implementation of both collaborator traits.
///
/// Simulates a single host with a routing table, a storage pool, and
/// environments that receive addresses from `10.0.0.0/24` in creation order.
/// Every call is journaled for later inspection, and failures can be injected
/// per environment name.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryBackend {
    /// Creates a backend with one gateway route (`eth0`) and one plain route.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the routing table.
    pub async fn set_routes(&self, routes: Vec<RouteEntry>) {
        self.state.lock().await.routes = routes;
    }

    /// Every environment reports "not assigned" for its first `lookups` lookups.
    pub async fn set_default_address_delay(&self, lookups: u32) {
        self.state.lock().await.default_address_delay = lookups;
    }

    /// The named environment reports "not assigned" for its first `lookups` lookups.
    pub async fn delay_address(&self, name: impl Into<String>, lookups: u32) {
        self.state
            .lock()
            .await
            .address_plans
            .insert(name.into(), AddressPlan::After(lookups));
    }

    /// The named environment never receives an address.
    pub async fn withhold_address(&self, name: impl Into<String>) {
        self.state
            .lock()
            .await
            .address_plans
            .insert(name.into(), AddressPlan::Never);
    }

    /// Address lookups for the named environment fail with a backend error.
    pub async fn fail_address_lookup(&self, name: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .await
            .address_lookup_failures
            .insert(name.into(), message.into());
    }

    /// Provisioning the named environment fails.
    pub async fn fail_provisioning(&self, name: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .await
            .provisioning_failures
            .insert(name.into(), message.into());
    }

    /// Queues the result of the next `execute` call. Unqueued calls succeed.
    pub async fn queue_execution_result(&self, result: ExecutionResult) {
        self.state.lock().await.execution_results.push_back(result);
    }

    /// Queues the acknowledgement of the next `spawn` call. Unqueued calls succeed.
    pub async fn queue_spawn_result(&self, result: ExecutionResult) {
        self.state.lock().await.spawn_results.push_back(result);
    }

    /// Returns every call received so far.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    /// Returns the names of all existing environments, sorted.
    pub async fn environment_names(&self) -> Vec<String> {
        self.state.lock().await.environments.keys().cloned().collect()
    }

    /// Returns the request an environment was created from.
    pub async fn environment_request(&self, name: &str) -> Option<EnvironmentRequest> {
        self.state
            .lock()
            .await
            .environments
            .get(name)
            .map(|env| env.request.clone())
    }

    pub async fn is_installed(&self, name: &str) -> bool {
        self.state
            .lock()
            .await
            .environments
            .get(name)
            .is_some_and(|env| env.installed)
    }

    pub async fn file_contents(&self, name: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .environments
            .get(name)
            .and_then(|env| env.files.get(path).cloned())
    }

    pub async fn directories(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .environments
            .get(name)
            .map(|env| env.directories.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn host_directories(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .await
            .host_directories
            .iter()
            .cloned()
            .collect()
    }

    /// Rendered command lines spawned in the named environment.
    pub async fn spawned_commands(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .environments
            .get(name)
            .map(|env| env.spawned.clone())
            .unwrap_or_default()
    }

    /// Rendered command lines executed in the named environment.
    pub async fn executed_commands(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .environments
            .get(name)
            .map(|env| env.executed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryBackend {
    async fn route_list(&self) -> Result<Vec<RouteEntry>> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::RouteList);
        Ok(state.routes.clone())
    }

    async fn ensure_volume(&self, pool: &str, name: &str) -> Result<PathBuf> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::EnsureVolume {
            pool: pool.to_string(),
            name: name.to_string(),
        });
        let path = state
            .volumes
            .entry((pool.to_string(), name.to_string()))
            .or_insert_with(|| PathBuf::from("/var/cache").join(pool).join(name))
            .clone();
        Ok(path)
    }

    async fn make_host_directory(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::MakeHostDirectory {
            path: path.to_path_buf(),
        });
        state.host_directories.insert(path.to_path_buf());
        Ok(())
    }

    async fn provision_environment(
        &self,
        request: &EnvironmentRequest,
    ) -> Result<EnvironmentHandle> {
        let mut state = self.state.lock().await;
        let reused = state.environments.contains_key(&request.name);
        state.calls.push(BackendCall::ProvisionEnvironment {
            name: request.name.clone(),
            reused,
        });

        if let Some(message) = state.provisioning_failures.get(&request.name) {
            return Err(BootstrapError::ProvisioningFailure(message.clone()));
        }
        if let Some(existing) = state.environments.get(&request.name) {
            return Ok(existing.handle.clone());
        }

        let octet = state.next_host_octet;
        if octet == u8::MAX {
            return Err(BootstrapError::ProvisioningFailure(
                "simulated address pool exhausted".to_string(),
            ));
        }
        state.next_host_octet += 1;

        let handle = EnvironmentHandle {
            name: request.name.clone(),
            id: format!("env-{}", state.environments.len() + 1),
        };
        state.environments.insert(
            request.name.clone(),
            InMemoryEnvironment {
                handle: handle.clone(),
                request: request.clone(),
                installed: false,
                address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, octet)),
                directories: BTreeSet::new(),
                files: BTreeMap::new(),
                spawned: Vec::new(),
                executed: Vec::new(),
            },
        );
        Ok(handle)
    }

    async fn install_environment(&self, handle: &EnvironmentHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::InstallEnvironment {
            name: handle.name.clone(),
        });
        state.environment_mut(handle)?.installed = true;
        Ok(())
    }

    async fn resolve_address(&self, handle: &EnvironmentHandle) -> Result<Option<IpAddr>> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.address_lookup_failures.get(&handle.name) {
            let message = message.clone();
            state.calls.push(BackendCall::ResolveAddress {
                name: handle.name.clone(),
                resolved: None,
            });
            return Err(BootstrapError::ProvisioningFailure(message));
        }

        let default_delay = state.default_address_delay;
        let plan = state
            .address_plans
            .entry(handle.name.clone())
            .or_insert(AddressPlan::After(default_delay));
        let assigned = match plan {
            AddressPlan::Never => false,
            AddressPlan::After(0) => true,
            AddressPlan::After(remaining) => {
                *remaining -= 1;
                false
            }
        };

        let env = state.environment_mut(handle)?;
        let resolved = (assigned && env.installed).then_some(env.address);
        state.calls.push(BackendCall::ResolveAddress {
            name: handle.name.clone(),
            resolved,
        });
        Ok(resolved)
    }
}

#[async_trait]
impl NodeShell for InMemoryBackend {
    async fn make_directory(&self, handle: &EnvironmentHandle, path: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::MakeDirectory {
            name: handle.name.clone(),
            path: path.to_string(),
        });
        state
            .environment_mut(handle)?
            .directories
            .insert(path.to_string());
        Ok(())
    }

    async fn remove_file(&self, handle: &EnvironmentHandle, path: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::RemoveFile {
            name: handle.name.clone(),
            path: path.to_string(),
        });
        state.environment_mut(handle)?.files.remove(path);
        Ok(())
    }

    async fn write_file(
        &self,
        handle: &EnvironmentHandle,
        path: &str,
        content: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::WriteFile {
            name: handle.name.clone(),
            path: path.to_string(),
        });
        state
            .environment_mut(handle)?
            .files
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        command: &CommandLine,
    ) -> Result<ExecutionResult> {
        let rendered = command.render();
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Execute {
            name: handle.name.clone(),
            command: rendered.clone(),
        });
        state.environment_mut(handle)?.executed.push(rendered);
        Ok(state
            .execution_results
            .pop_front()
            .unwrap_or_else(|| ExecutionResult::success("{ \"ok\" : 1 }")))
    }

    async fn spawn(
        &self,
        handle: &EnvironmentHandle,
        command: &CommandLine,
    ) -> Result<ExecutionResult> {
        let rendered = command.render();
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Spawn {
            name: handle.name.clone(),
            command: rendered.clone(),
        });
        state.environment_mut(handle)?.spawned.push(rendered);
        Ok(state
            .spawn_results
            .pop_front()
            .unwrap_or_else(|| ExecutionResult::success("")))
    }
}
