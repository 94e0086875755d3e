//! Project configuration: named boards, systems and cache settings.
//!
//! The [`Registry`] holds the current configuration as an immutable
//! snapshot. Readers clone the `Arc` and keep a consistent view for as long
//! as they need it; mutations build a new value, persist it and swap it in.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::CacheConfig;
use crate::core::NetgraphError;
use crate::query::NotFound;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "NETGRAPH_CONFIG";

const LOCAL_NAMES: [&str; 2] = [".netgraph.yaml", ".netgraph.yml"];
const PARENT_LEVELS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Components system traces must not route through.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Member board names, in order.
    pub boards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub boards: BTreeMap<String, BoardConfig>,
    #[serde(default)]
    pub systems: BTreeMap<String, SystemConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Directory relative board paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn from_yaml(text: &str) -> Result<Self, NetgraphError> {
        serde_yaml::from_str(text).map_err(|e| NetgraphError::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, NetgraphError> {
        serde_yaml::to_string(self).map_err(|e| NetgraphError::Config(e.to_string()))
    }

    /// Load `path`; relative paths inside resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, NetgraphError> {
        let text = fs::read_to_string(path).map_err(|source| NetgraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text)
            .map_err(|e| NetgraphError::Config(format!("{}: {e}", path.display())))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.cache.directory = expand_home(&config.cache.directory);
        Ok(config)
    }

    /// Expand `~/` and anchor relative paths at the config directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        let expanded = expand_home(path);
        match &self.base_dir {
            Some(base) if expanded.is_relative() => base.join(expanded),
            _ => expanded,
        }
    }

    pub fn board_path(&self, name: &str) -> Option<PathBuf> {
        self.boards.get(name).map(|b| self.resolve_path(&b.path))
    }

    pub fn board(&self, name: &str) -> Result<&BoardConfig, NotFound> {
        self.boards.get(name).ok_or_else(|| NotFound::board(name))
    }

    pub fn system(&self, name: &str) -> Result<&SystemConfig, NotFound> {
        self.systems.get(name).ok_or_else(|| NotFound::system(name))
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Find the configuration file: `$NETGRAPH_CONFIG`, then `.netgraph.yaml`
/// or `.netgraph.yml` in `start` or up to four parents, then
/// `~/.config/netgraph/config.yaml`.
pub fn discover(start: &Path) -> Option<PathBuf> {
    discover_with(
        start,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn discover_with(start: &Path, env: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = env {
        return Some(path);
    }
    for dir in start.ancestors().take(PARENT_LEVELS + 1) {
        for name in LOCAL_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    home.map(|h| h.join(".config").join("netgraph").join("config.yaml"))
        .filter(|p| p.is_file())
}

/// Runtime-mutable view of the project configuration.
#[derive(Debug)]
pub struct Registry {
    /// File mutations are written to; `None` keeps them in memory.
    path: Option<PathBuf>,
    current: RwLock<Arc<ProjectConfig>>,
}

impl Registry {
    /// In-memory registry; mutations are not persisted.
    pub fn from_config(config: ProjectConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Registry backed by `path`. A missing file starts empty and is created
    /// on the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, NetgraphError> {
        let path = path.into();
        let config = if path.exists() {
            ProjectConfig::load(&path)?
        } else {
            ProjectConfig {
                base_dir: path.parent().map(Path::to_path_buf),
                ..ProjectConfig::default()
            }
        };
        debug!(path = %path.display(), boards = config.boards.len(), "configuration loaded");
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Open the discovered configuration, or an empty in-memory one.
    pub fn discover() -> Result<Self, NetgraphError> {
        let cwd = std::env::current_dir().map_err(|source| NetgraphError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        match discover(&cwd) {
            Some(path) => Self::open(path),
            None => Ok(Self::from_config(ProjectConfig::default())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The configuration as of now. Later mutations do not affect it.
    pub fn snapshot(&self) -> Arc<ProjectConfig> {
        Arc::clone(&self.current.read())
    }

    /// Re-read the backing file.
    pub fn reload(&self) -> Result<(), NetgraphError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let config = if path.exists() {
            ProjectConfig::load(path)?
        } else {
            ProjectConfig {
                base_dir: path.parent().map(Path::to_path_buf),
                ..ProjectConfig::default()
            }
        };
        *self.current.write() = Arc::new(config);
        info!(path = %path.display(), "configuration reloaded");
        Ok(())
    }

    pub fn add_board(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        description: Option<String>,
    ) -> Result<(), NetgraphError> {
        let board = BoardConfig {
            path: path.into(),
            description,
            ignore: Vec::new(),
        };
        self.update(|config| {
            config.boards.insert(name.to_string(), board);
            Ok(())
        })?;
        info!(board = name, "board registered");
        Ok(())
    }

    pub fn remove_board(&self, name: &str) -> Result<(), NetgraphError> {
        self.update(|config| {
            config
                .boards
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| NotFound::board(name).into())
        })?;
        info!(board = name, "board removed");
        Ok(())
    }

    /// Register a system. Every member must be a configured board.
    pub fn add_system(
        &self,
        name: &str,
        boards: Vec<String>,
        description: Option<String>,
    ) -> Result<(), NetgraphError> {
        self.update(|config| {
            if let Some(missing) = boards.iter().find(|b| !config.boards.contains_key(*b)) {
                return Err(NotFound::board(missing.as_str()).into());
            }
            config.systems.insert(
                name.to_string(),
                SystemConfig {
                    boards: boards.clone(),
                    description,
                },
            );
            Ok(())
        })?;
        info!(system = name, "system registered");
        Ok(())
    }

    pub fn remove_system(&self, name: &str) -> Result<(), NetgraphError> {
        self.update(|config| {
            config
                .systems
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| NotFound::system(name).into())
        })?;
        info!(system = name, "system removed");
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> Result<(), NetgraphError>
    where
        F: FnOnce(&mut ProjectConfig) -> Result<(), NetgraphError>,
    {
        let mut current = self.current.write();
        let mut next = ProjectConfig::clone(&current);
        mutate(&mut next)?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *current = Arc::new(next);
        Ok(())
    }
}

fn persist(path: &Path, config: &ProjectConfig) -> Result<(), NetgraphError> {
    let yaml = config.to_yaml()?;
    let io_err = |source| NetgraphError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}
