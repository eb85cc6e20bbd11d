//! Module source loading.
//!
//! A module call's `source` is handed to a [`ModuleLoader`], which returns
//! the parsed files of the called module. Only local paths are ever read;
//! registry, VCS and archive sources yield `None` and the module is treated
//! as opaque. There is no network access.

use crate::config::Config;
use crate::error::{Result, TfSieveError};
use crate::parser::{HclParser, ParsedFile, Parser};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Files of one loaded module.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Stable identity of the source, used to detect module-source cycles
    pub key: String,
    /// Directory the module was read from, if it lives on disk
    pub directory: Option<PathBuf>,
    /// Parsed files of the module
    pub files: Vec<ParsedFile>,
}

/// Loads the files of a called module.
///
/// This is the seam for embedding: tests and library users can provide
/// pre-parsed modules instead of reading the file system.
pub trait ModuleLoader: Send + Sync {
    /// Load the module named by `source`, as written in a module call made
    /// from `caller_dir`.
    ///
    /// Returns `Ok(None)` for sources this loader does not handle.
    ///
    /// # Errors
    ///
    /// Returns an error if a handled source cannot be read or parsed.
    fn load(&self, source: &str, caller_dir: Option<&Path>) -> Result<Option<LoadedModule>>;
}

/// Check if a module source is a local path.
#[must_use]
pub fn is_local_source(source: &str) -> bool {
    source.starts_with("./")
        || source.starts_with("../")
        || source.starts_with('/')
        || (source.len() >= 3 && source.chars().nth(1) == Some(':')) // Windows paths
}

/// Loads modules from local directories.
pub struct LocalModuleLoader {
    parser: HclParser,
}

impl LocalModuleLoader {
    /// Create a loader that parses with the given configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            parser: HclParser::new(config),
        }
    }

    /// Load a module directory directly, without a module call.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or parsed.
    pub fn load_directory(&self, directory: &Path) -> Result<LoadedModule> {
        let canonical = std::fs::canonicalize(directory)
            .map_err(|e| TfSieveError::io(directory, e, file!(), line!()))?;
        let files = self.parser.parse_directory(&canonical)?;
        Ok(LoadedModule {
            key: canonical.display().to_string(),
            directory: Some(canonical),
            files,
        })
    }
}

impl ModuleLoader for LocalModuleLoader {
    fn load(&self, source: &str, caller_dir: Option<&Path>) -> Result<Option<LoadedModule>> {
        let source = source.trim();
        if !is_local_source(source) {
            tracing::debug!(source = %source, "Skipping non-local module source");
            return Ok(None);
        }

        let path = Path::new(source);
        let directory = match caller_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };

        if !directory.is_dir() {
            return Err(crate::err!(ModuleSource {
                module_source: source.to_string(),
                message: format!("directory {} does not exist", directory.display()),
            }));
        }

        tracing::debug!(source = %source, directory = %directory.display(), "Loading local module");
        self.load_directory(&directory).map(Some)
    }
}

/// Serves pre-parsed modules keyed by their exact `source` string.
#[derive(Debug, Default)]
pub struct MemoryModuleLoader {
    modules: HashMap<String, Vec<ParsedFile>>,
}

impl MemoryModuleLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the files served for `source`.
    pub fn insert(&mut self, source: impl Into<String>, files: Vec<ParsedFile>) {
        self.modules.insert(source.into(), files);
    }

    /// Parse HCL text and register it as a single-file module.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid HCL.
    pub fn insert_hcl(&mut self, source: impl Into<String>, file_name: &str, content: &str) -> Result<()> {
        let parser = HclParser::new(&Config::default());
        let parsed = parser.parse_content(content, Path::new(file_name))?;
        self.modules.entry(source.into()).or_default().push(parsed);
        Ok(())
    }
}

impl ModuleLoader for MemoryModuleLoader {
    fn load(&self, source: &str, _caller_dir: Option<&Path>) -> Result<Option<LoadedModule>> {
        Ok(self.modules.get(source).map(|files| LoadedModule {
            key: source.to_string(),
            directory: None,
            files: files.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_local_source() {
        assert!(is_local_source("./modules/vpc"));
        assert!(is_local_source("../shared"));
        assert!(is_local_source("/abs/path"));
        assert!(!is_local_source("terraform-aws-modules/vpc/aws"));
        assert!(!is_local_source("git::https://example.com/module.git"));
    }

    #[test]
    fn test_local_loader_resolves_relative_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("modules/disk");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(
            module_dir.join("main.tf"),
            r#"resource "aws_ebs_volume" "this" { size = 10 }"#,
        )
        .unwrap();

        let loader = LocalModuleLoader::new(&Config::default());
        let loaded = loader
            .load("./modules/disk", Some(dir.path()))
            .unwrap()
            .expect("local source should load");

        assert_eq!(loaded.files.len(), 1);
        assert!(loaded.directory.is_some());
    }

    #[test]
    fn test_local_loader_skips_remote_sources() {
        let loader = LocalModuleLoader::new(&Config::default());
        let loaded = loader.load("terraform-aws-modules/ebs/aws", None).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_local_loader_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let loader = LocalModuleLoader::new(&Config::default());
        let err = loader.load("./nope", Some(dir.path())).unwrap_err();
        assert!(matches!(err, TfSieveError::ModuleSource { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_memory_loader() {
        let mut loader = MemoryModuleLoader::new();
        loader
            .insert_hcl("./disk", "main.tf", r#"output "id" { value = "x" }"#)
            .unwrap();

        let loaded = loader.load("./disk", None).unwrap().unwrap();
        assert_eq!(loaded.key, "./disk");
        assert_eq!(loaded.files[0].blocks[0].block_type, "output");
        assert!(loader.load("./other", None).unwrap().is_none());
    }
}
