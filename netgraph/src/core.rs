//! Core entry points shared by the library API and the CLI.
//! No process or terminal state lives here.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::board::{Board, BoardParts, FileSignature, SourceFile};
use crate::cache::BoardCache;
use crate::config::{BoardConfig, ProjectConfig, Registry, SystemConfig};
use crate::model::{ModelError, NoSheets, Schematic, SchematicBuilder, SheetLoadError, SheetLoader};
use crate::netlist::{resolve, Resolution};
use crate::parser::{KicadParser, ParseError, RawSchematic};
use crate::query::NotFound;
use crate::system::System;

#[derive(Debug, thiserror::Error)]
pub enum NetgraphError {
    #[error("Parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("Cannot build {}: {source}", path.display())]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Cache error: {0}")]
    Cache(String),
}

impl NetgraphError {
    /// Parse and model failures, as opposed to lookups and I/O.
    pub fn is_build_error(&self) -> bool {
        matches!(self, NetgraphError::Parse { .. } | NetgraphError::Model { .. })
    }

    fn from_model(path: &Path, error: ModelError) -> Self {
        match error {
            ModelError::SheetLoad {
                file,
                source: SheetLoadError::Parse(source),
                ..
            } => NetgraphError::Parse { path: file, source },
            ModelError::SheetLoad {
                file,
                source: SheetLoadError::Io(source),
                ..
            } => NetgraphError::Io { path: file, source },
            other => NetgraphError::Model {
                path: path.to_path_buf(),
                source: other,
            },
        }
    }
}

/// Reads sheet files from disk and records what it read.
#[derive(Default)]
struct FileLoader {
    sources: Vec<SourceFile>,
}

impl FileLoader {
    fn read(&mut self, path: &Path) -> std::io::Result<String> {
        // Signature first: a later edit then shows up as stale.
        let signature = FileSignature::read(path)?;
        let text = fs::read_to_string(path)?;
        self.sources.push(SourceFile {
            path: path.to_path_buf(),
            signature,
        });
        Ok(text)
    }
}

impl SheetLoader for FileLoader {
    fn load(&mut self, path: &Path) -> Result<(PathBuf, RawSchematic), SheetLoadError> {
        let resolved = fs::canonicalize(path)?;
        let text = self.read(&resolved)?;
        let raw = KicadParser::parse_str(&text)?;
        Ok((resolved, raw))
    }
}

/// Parse, build and resolve the schematic at `path`, following its sheets.
pub fn build_board(path: &Path) -> Result<Board, NetgraphError> {
    let started = Instant::now();
    let io_err = |source| NetgraphError::Io {
        path: path.to_path_buf(),
        source,
    };
    let resolved = fs::canonicalize(path).map_err(io_err)?;
    let mut loader = FileLoader::default();
    let text = loader.read(&resolved).map_err(io_err)?;

    let raw = KicadParser::parse_str(&text).map_err(|source| NetgraphError::Parse {
        path: resolved.clone(),
        source,
    })?;
    let schematic = SchematicBuilder::new(&mut loader)
        .build(&raw, Some(resolved.as_path()))
        .map_err(|e| NetgraphError::from_model(&resolved, e))?;
    let resolution = resolve(&schematic);

    let name = resolved
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("board")
        .to_string();
    let board = assemble(name, Some(resolved), loader.sources, schematic, resolution);
    info!(
        board = %board.name,
        sheets = board.sheets.len(),
        components = board.components.len(),
        nets = board.nets.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "board built"
    );
    Ok(board)
}

/// Build a board from schematic text. Hierarchical sheets cannot be
/// followed and fail with [`ModelError::SheetUnavailable`].
pub fn build_board_from_str(text: &str, name: &str) -> Result<Board, NetgraphError> {
    let path = PathBuf::from(name);
    let raw = KicadParser::parse_str(text).map_err(|source| NetgraphError::Parse {
        path: path.clone(),
        source,
    })?;
    let schematic = SchematicBuilder::new(&mut NoSheets)
        .build(&raw, None)
        .map_err(|e| NetgraphError::from_model(&path, e))?;
    let resolution = resolve(&schematic);
    Ok(assemble(name.to_string(), None, Vec::new(), schematic, resolution))
}

fn assemble(
    name: String,
    path: Option<PathBuf>,
    sources: Vec<SourceFile>,
    schematic: Schematic,
    resolution: Resolution,
) -> Board {
    Board::new(BoardParts {
        name,
        path,
        sources,
        root_uuid: schematic.root_uuid,
        sheets: schematic.sheets,
        components: schematic.components,
        nets: resolution.nets,
        diagnostics: resolution.diagnostics,
        no_connects: resolution.no_connects,
    })
}

/// Configuration registry plus board cache: the API used by both the CLI
/// and embedding applications.
pub struct NetgraphCore {
    registry: Registry,
    cache: BoardCache,
}

impl NetgraphCore {
    pub fn new(registry: Registry) -> Self {
        let cache = BoardCache::new(registry.snapshot().cache.clone());
        Self { registry, cache }
    }

    /// Core over the discovered configuration file, if any.
    pub fn discover() -> Result<Self, NetgraphError> {
        Registry::discover().map(Self::new)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &BoardCache {
        &self.cache
    }

    /// A configured board name, else a schematic path.
    pub fn resolve_source(&self, source: &str) -> Result<PathBuf, NetgraphError> {
        let config = self.registry.snapshot();
        if let Some(path) = config.board_path(source) {
            return Ok(path);
        }
        let path = PathBuf::from(source);
        if path.is_file() {
            Ok(path)
        } else {
            Err(NotFound::board(source).into())
        }
    }

    pub fn load_board(&self, source: &str) -> Result<Arc<Board>, NetgraphError> {
        let path = self.resolve_source(source)?;
        self.cache.get_or_build(&path)
    }

    /// Load every member of a configured system through the cache.
    pub fn load_system(&self, name: &str) -> Result<System, NetgraphError> {
        let config = self.registry.snapshot();
        let declared = config.system(name)?;
        let mut system = System::new(name);
        system.description = declared.description.clone();
        for board_name in &declared.boards {
            let board_config = config.board(board_name)?;
            let board = self.cache.get_or_build(&config.resolve_path(&board_config.path))?;
            system.add_board(board_name.as_str(), board, board_config.ignore.iter().cloned());
        }
        Ok(system)
    }

    /// Re-read the configuration file. Cached boards stay valid as long as
    /// their sources are unchanged.
    pub fn reload(&self) -> Result<(), NetgraphError> {
        self.registry.reload()
    }

    pub fn config(&self) -> Arc<ProjectConfig> {
        self.registry.snapshot()
    }

    pub fn boards(&self) -> Vec<(String, BoardConfig)> {
        let config = self.registry.snapshot();
        config
            .boards
            .iter()
            .map(|(name, board)| (name.clone(), board.clone()))
            .collect()
    }

    pub fn systems(&self) -> Vec<(String, SystemConfig)> {
        let config = self.registry.snapshot();
        config
            .systems
            .iter()
            .map(|(name, system)| (name.clone(), system.clone()))
            .collect()
    }

    pub fn add_board(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        description: Option<String>,
    ) -> Result<(), NetgraphError> {
        self.registry.add_board(name, path, description)
    }

    pub fn remove_board(&self, name: &str) -> Result<(), NetgraphError> {
        if let Some(path) = self.registry.snapshot().board_path(name) {
            self.cache.invalidate(&path);
        }
        self.registry.remove_board(name)
    }

    pub fn add_system(
        &self,
        name: &str,
        boards: Vec<String>,
        description: Option<String>,
    ) -> Result<(), NetgraphError> {
        self.registry.add_system(name, boards, description)
    }

    pub fn remove_system(&self, name: &str) -> Result<(), NetgraphError> {
        self.registry.remove_system(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_parse_errors_name_the_sheet_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root.kicad_sch");
        fs::write(
            &root,
            r#"(kicad_sch (version 20231120) (uuid "r")
  (sheet (at 10 10) (size 20 20) (uuid "s1")
    (property "Sheetname" "Child")
    (property "Sheetfile" "child.kicad_sch")))"#,
        )
        .unwrap();
        fs::write(dir.path().join("child.kicad_sch"), "(kicad_sch (wire (pts").unwrap();

        match build_board(&root) {
            Err(NetgraphError::Parse { path, .. }) => assert!(path.ends_with("child.kicad_sch")),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_sheet_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root.kicad_sch");
        fs::write(
            &root,
            r#"(kicad_sch (version 20231120) (uuid "r")
  (sheet (at 10 10) (size 20 20) (uuid "s1")
    (property "Sheetname" "Child")
    (property "Sheetfile" "gone.kicad_sch")))"#,
        )
        .unwrap();
        let err = build_board(&root).unwrap_err();
        assert!(matches!(err, NetgraphError::Io { .. }));
        assert!(!err.is_build_error());
    }

    #[test]
    fn test_in_memory_build_rejects_sheets() {
        let text = r#"(kicad_sch (version 20231120)
  (sheet (at 10 10) (size 20 20) (uuid "s1")
    (property "Sheetname" "Child")
    (property "Sheetfile" "child.kicad_sch")))"#;
        let err = build_board_from_str(text, "mem").unwrap_err();
        assert!(matches!(
            err,
            NetgraphError::Model {
                source: ModelError::SheetUnavailable { .. },
                ..
            }
        ));
        assert!(err.is_build_error());
    }

    #[test]
    fn test_unknown_source_is_not_found() {
        let core = NetgraphCore::new(Registry::from_config(ProjectConfig::default()));
        assert!(matches!(
            core.load_board("no-such-board"),
            Err(NetgraphError::NotFound(NotFound::Board { .. }))
        ));
        assert!(matches!(
            core.load_system("rig"),
            Err(NetgraphError::NotFound(NotFound::System { .. }))
        ));
    }
}
