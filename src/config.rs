use std::net::SocketAddr;
use std::path::PathBuf;

/// Default bound on the number of completed jobs kept in history.
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 10_000;

/// Configuration for Docker-based job execution.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Docker image to use for job execution
    pub image: String,
    /// Disable network access in container
    pub network_disabled: bool,
    /// Memory limit (e.g., "256m")
    pub memory_limit: Option<String>,
    /// CPU limit (e.g., "0.5" for half a CPU)
    pub cpu_limit: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "alpine:latest".to_string(),
            network_disabled: true,
            memory_limit: Some("256m".to_string()),
            cpu_limit: Some("0.5".to_string()),
        }
    }
}

/// Multi-tenancy settings for the queue overlay.
#[derive(Debug, Clone)]
pub struct TenancyConfig {
    /// Tag and filter jobs by owner. When false every caller is `public`.
    pub enabled: bool,
    /// Maximum number of history records kept across all owners.
    pub max_history_size: usize,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
        }
    }
}

/// Filesystem roots that get per-owner namespaces.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub temp_root: PathBuf,
    /// Payload key whose value is rewritten to `<owner>/<value>` on submit.
    pub prefix_field: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("input"),
            output_root: PathBuf::from("output"),
            temp_root: PathBuf::from("temp"),
            prefix_field: "filename_prefix".to_string(),
        }
    }
}

/// URL roots whose first segment after the root names an owner.
#[derive(Debug, Clone)]
pub struct FolderConfig {
    /// Enforce owner-only access below `namespaced_roots`.
    pub enabled: bool,
    pub namespaced_roots: Vec<String>,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespaced_roots: vec![
                "/output".to_string(),
                "/input".to_string(),
                "/temp".to_string(),
            ],
        }
    }
}

/// Admin-only management routes.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Restrict the routes below to the admin account.
    pub enabled: bool,
    /// Matched case-insensitively as a path prefix.
    pub directory: String,
    /// Matched exactly as path prefixes.
    pub route_prefixes: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "/extensions/comfyui-manager".to_string(),
            route_prefixes: vec![
                "api/customnode".to_string(),
                "api/snapshot".to_string(),
                "/api/manager".to_string(),
                "api/comfyui_manager".to_string(),
                "api/externalmodel".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_addr: SocketAddr,
    /// JSON file with registered users. `None` starts with no users.
    pub users_file: Option<PathBuf>,
    /// How long the worker blocks on an empty queue before re-checking shutdown.
    pub worker_poll_ms: u64,
    /// Run jobs in Docker. `None` completes jobs without executing anything.
    pub sandbox: Option<SandboxConfig>,
    pub tenancy: TenancyConfig,
    pub storage: StorageConfig,
    pub folders: FolderConfig,
    pub manager: ManagerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8188)),
            users_file: None,
            worker_poll_ms: 1000,
            sandbox: None,
            tenancy: TenancyConfig::default(),
            storage: StorageConfig::default(),
            folders: FolderConfig::default(),
            manager: ManagerConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.storage.input_root = root.join("input");
        self.storage.output_root = root.join("output");
        self.storage.temp_root = root.join("temp");
        self
    }

    pub fn with_max_history(mut self, max_history_size: usize) -> Self {
        self.tenancy.max_history_size = max_history_size;
        self
    }

    pub fn single_tenant(mut self) -> Self {
        self.tenancy.enabled = false;
        self.folders.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.image, "alpine:latest");
        assert!(cfg.network_disabled);
        assert_eq!(cfg.memory_limit.as_deref(), Some("256m"));
        assert_eq!(cfg.cpu_limit.as_deref(), Some("0.5"));
    }

    #[test]
    fn tenancy_config_default() {
        let cfg = TenancyConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.max_history_size, 10_000);
    }

    #[test]
    fn storage_config_default() {
        let cfg = StorageConfig::default();
        assert_eq!(cfg.input_root, PathBuf::from("input"));
        assert_eq!(cfg.output_root, PathBuf::from("output"));
        assert_eq!(cfg.temp_root, PathBuf::from("temp"));
        assert_eq!(cfg.prefix_field, "filename_prefix");
    }

    #[test]
    fn manager_config_default() {
        let cfg = ManagerConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.directory, "/extensions/comfyui-manager");
        assert_eq!(cfg.route_prefixes.len(), 5);
        assert!(cfg.route_prefixes.iter().any(|p| p == "/api/manager"));
    }

    #[test]
    fn folder_config_default() {
        let cfg = FolderConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.namespaced_roots, vec!["/output", "/input", "/temp"]);
    }

    #[test]
    fn node_config_default() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8188");
        assert!(cfg.users_file.is_none());
        assert_eq!(cfg.worker_poll_ms, 1000);
        assert!(cfg.sandbox.is_none());
    }

    #[test]
    fn node_config_new() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = NodeConfig::new(addr);
        assert_eq!(cfg.listen_addr, addr);
        assert!(cfg.tenancy.enabled);
    }

    #[test]
    fn node_config_builders() {
        let cfg = NodeConfig::default()
            .with_storage_root("/srv/data")
            .with_max_history(3)
            .single_tenant();
        assert_eq!(cfg.storage.input_root, PathBuf::from("/srv/data/input"));
        assert_eq!(cfg.storage.output_root, PathBuf::from("/srv/data/output"));
        assert_eq!(cfg.storage.temp_root, PathBuf::from("/srv/data/temp"));
        assert_eq!(cfg.tenancy.max_history_size, 3);
        assert!(!cfg.tenancy.enabled);
        assert!(!cfg.folders.enabled);
    }
}
