//! Inlines `use`d source files before tokenizing.
//!
//! Native module names survive as a `use` statement for the interpreter to load.
//! Any other name is read from disk relative to the file that mentions it.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::tree_walk_interpreter::MODULE_NAMES;

pub const EXTENSION: &str = "sch";

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("[line {line}] Malformed use line in '{path}'.")]
    MalformedUse { path: PathBuf, line: usize },
}

#[derive(Debug)]
pub struct Preprocessor {
    root: PathBuf,
    included: FxHashSet<PathBuf>,
}

impl Preprocessor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            root: path.into(),
            included: FxHashSet::default(),
        }
    }

    /// Produces the concatenated source of the root file and everything it uses.
    pub fn process(mut self) -> Result<String, PreprocessError> {
        let root = self.root.clone();
        self.included.insert(canonical(&root));
        let mut output = String::new();
        self.inline(&root, &mut output)?;
        tracing::debug!(files = self.included.len(), "preprocessed");
        Ok(output)
    }

    fn inline(&mut self, path: &Path, output: &mut String) -> Result<(), PreprocessError> {
        let source = std::fs::read_to_string(path).map_err(|source| PreprocessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = path.parent().unwrap_or_else(|| Path::new(""));

        for (index, line) in source.lines().enumerate() {
            let Some(names) = use_line(line) else {
                output.push_str(line);
                output.push('\n');
                continue;
            };
            let names = names.ok_or_else(|| PreprocessError::MalformedUse {
                path: path.to_path_buf(),
                line: index + 1,
            })?;

            let (native, files): (Vec<&str>, Vec<&str>) =
                names.into_iter().partition(|name| MODULE_NAMES.contains(name));
            if !native.is_empty() {
                output.push_str(&format!("use {};", native.join(", ")));
            }
            output.push('\n');

            for name in files {
                let file = module_path(directory, name);
                if !self.included.insert(canonical(&file)) {
                    tracing::warn!(module = name, "module already included, skipping");
                    continue;
                }
                tracing::debug!(path = %file.display(), "including module");
                self.inline(&file, output)?;
            }
        }

        Ok(())
    }
}

/// `None` when the line is not a `use` line, `Some(None)` when it is malformed.
fn use_line(line: &str) -> Option<Option<Vec<&str>>> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix("use")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let names = rest.trim().strip_suffix(';').map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
    });
    Some(names.filter(|names| !names.is_empty()))
}

fn module_path(directory: &Path, name: &str) -> PathBuf {
    if name.contains('.') {
        directory.join(name)
    } else {
        directory.join(format!("{name}.{EXTENSION}"))
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
