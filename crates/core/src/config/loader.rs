//! Configuration file loader for `.sequence-kit/` directory structure.
//!
//! This module provides functionality to load and parse all configuration files
//! from the `.sequence-kit/` directory, including:
//! - `config.toml`: Global settings
//! - `sequences/*.yaml`: Sequence definitions
//! - `lists/*.yaml`: Global lists

use crate::config::error::LoadError;
use crate::config::error::LoadResult;
use crate::config::models::AppConfig;
use serde::de::DeserializeOwned;
use sk_protocol::config_models::GlobalConfig;
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::GlobalList;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the configuration directory under a project root.
pub const CONFIG_DIR: &str = ".sequence-kit";

/// Loads all configuration from the `.sequence-kit/` directory.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.sequence-kit/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. Missing directories
/// or files yield the default (empty) configuration rather than an error.
///
/// # Errors
///
/// Returns `LoadError` if:
/// - Files exist but cannot be read
/// - Files have invalid TOML or YAML syntax
/// - Two sequences or two lists share a name
/// - A list's matrix dimensions disagree with its number of values
///
/// # Example
///
/// ```rust,no_run
/// use sk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} sequences", config.sequences.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> LoadResult<AppConfig> {
    let sk_dir = root.join(CONFIG_DIR);

    if !sk_dir.exists() {
        return Ok(AppConfig::default());
    }

    let global = load_global_config(&sk_dir)?;
    let sequences = load_sequences(&sk_dir)?;
    let lists = load_lists(&sk_dir)?;

    tracing::debug!(
        sequences = sequences.len(),
        lists = lists.len(),
        "Loaded configuration from {}",
        sk_dir.display()
    );

    Ok(AppConfig {
        global,
        sequences,
        lists,
    })
}

/// Loads global configuration from `config.toml`.
fn load_global_config(sk_dir: &Path) -> LoadResult<GlobalConfig> {
    let config_path = sk_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content = std::fs::read_to_string(&config_path).map_err(|source| LoadError::FileRead {
        path: config_path.clone(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| LoadError::TomlParse {
        path: config_path,
        source,
    })
}

/// Parses every `.yaml`/`.yml` file directly inside `dir`, in file name order.
fn load_yaml_dir<T: DeserializeOwned>(dir: &Path) -> LoadResult<Vec<(PathBuf, T)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|source| LoadError::DirectoryWalk {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();

        let ext = path.extension().and_then(|s| s.to_str());
        if ext != Some("yaml") && ext != Some("yml") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| LoadError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let item: T = serde_yaml::from_str(&content).map_err(|source| LoadError::YamlParse {
            path: path.to_path_buf(),
            source,
        })?;

        items.push((path.to_path_buf(), item));
    }

    Ok(items)
}

fn ensure_unique(seen: &mut HashSet<String>, name: &str, path: &Path, what: &str) -> LoadResult<()> {
    if seen.insert(name.to_string()) {
        Ok(())
    } else {
        Err(LoadError::InvalidConfig {
            path: path.to_path_buf(),
            reason: format!("{what} '{name}' is defined more than once"),
        })
    }
}

/// Loads all sequence definitions from `sequences/*.yaml`.
///
/// Blocks and variables are attached to the sequence they were defined in.
fn load_sequences(sk_dir: &Path) -> LoadResult<Vec<Sequence>> {
    let mut seen = HashSet::new();
    let mut sequences = Vec::new();

    for (path, mut sequence) in load_yaml_dir::<Sequence>(&sk_dir.join("sequences"))? {
        ensure_unique(&mut seen, &sequence.name, &path, "Sequence")?;

        let sequence_id = sequence.id;
        for block in &mut sequence.blocks {
            block.sequence_id = sequence_id;
        }
        for variable in &mut sequence.variables {
            variable.sequence_id = Some(sequence_id);
        }
        sequences.push(sequence);
    }

    Ok(sequences)
}

/// Loads all global lists from `lists/*.yaml`.
fn load_lists(sk_dir: &Path) -> LoadResult<Vec<GlobalList>> {
    let mut seen = HashSet::new();
    let mut lists = Vec::new();

    for (path, list) in load_yaml_dir::<GlobalList>(&sk_dir.join("lists"))? {
        ensure_unique(&mut seen, &list.name, &path, "List")?;

        if let Some(dims) = list.matrix_dimensions {
            if dims.rows * dims.cols != list.values.len() {
                return Err(LoadError::InvalidConfig {
                    path,
                    reason: format!(
                        "List '{}' declares a {}x{} matrix but has {} values",
                        list.name,
                        dims.rows,
                        dims.cols,
                        list.values.len()
                    ),
                });
            }
        }
        lists.push(list);
    }

    Ok(lists)
}
