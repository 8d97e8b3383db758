//! Validation and source-set resolution for run configurations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{DestinationSpec, RunConfig, SourceSet};

impl RunConfig {
    /// Check the configuration without touching any output path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] describing the first failed check.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sources.is_empty() {
            return Err(ConfigError::invalid("sources", "empty", None));
        }
        if self.cpu_workers == 0 {
            return Err(ConfigError::invalid("cpu_workers", "must_be_positive", Some("0".into())));
        }
        if self.io_workers == 0 {
            return Err(ConfigError::invalid("io_workers", "must_be_positive", Some("0".into())));
        }

        match &self.destinations {
            DestinationSpec::Shared(dir) => validate_destination_dir(dir)?,
            DestinationSpec::PerSource(dirs) => {
                if dirs.len() != self.sources.len() {
                    return Err(ConfigError::invalid(
                        "destinations",
                        "count_mismatch",
                        Some(format!(
                            "{} destinations for {} sources",
                            dirs.len(),
                            self.sources.len()
                        )),
                    ));
                }
                for dir in dirs {
                    validate_destination_dir(dir)?;
                }
            }
        }

        let mut bases = HashSet::new();
        for (index, source) in self.sources.iter().enumerate() {
            let (_, name) = split_source(source)?;
            let dir = self
                .destinations
                .dir_for(index)
                .ok_or_else(|| ConfigError::invalid("destinations", "missing_entry", None))?;
            reject_nested_destination(source, dir)?;
            let base = dir.join(name);
            if !bases.insert(base.clone()) {
                return Err(ConfigError::invalid(
                    "sources",
                    "duplicate_destination",
                    Some(base.display().to_string()),
                ));
            }
        }

        Ok(())
    }

    /// Validate and resolve one [`SourceSet`] per source, in input order.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn source_sets(&self) -> ConfigResult<Vec<SourceSet>> {
        self.validate()?;
        self.sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let (working_root, name) = split_source(source)?;
                let dir = self
                    .destinations
                    .dir_for(index)
                    .ok_or_else(|| ConfigError::invalid("destinations", "missing_entry", None))?;
                Ok(SourceSet::new(
                    source.clone(),
                    working_root,
                    name,
                    dir,
                    self.extension,
                ))
            })
            .collect()
    }
}

fn split_source(source: &Path) -> ConfigResult<(PathBuf, String)> {
    let display = || Some(source.display().to_string());
    if !source.is_absolute() {
        return Err(ConfigError::invalid("sources", "not_absolute", display()));
    }
    if !source.is_dir() {
        return Err(ConfigError::invalid("sources", "not_a_directory", display()));
    }
    let parent = source
        .parent()
        .ok_or_else(|| ConfigError::invalid("sources", "no_parent", display()))?;
    let name = source
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ConfigError::invalid("sources", "unnamed", display()))?;
    Ok((parent.to_path_buf(), name.to_string()))
}

/// A destination equal to or below its source would be enumerated into its own
/// container and removed along with the source.
fn reject_nested_destination(source: &Path, dir: &Path) -> ConfigResult<()> {
    let resolve = |path: &Path| {
        path.canonicalize().map_err(|_| {
            ConfigError::invalid("destinations", "unresolvable", Some(path.display().to_string()))
        })
    };
    if resolve(dir)?.starts_with(resolve(source)?) {
        return Err(ConfigError::invalid(
            "sources",
            "destination_inside_source",
            Some(dir.display().to_string()),
        ));
    }
    Ok(())
}

fn validate_destination_dir(dir: &Path) -> ConfigResult<()> {
    if !dir.is_absolute() {
        return Err(ConfigError::invalid(
            "destinations",
            "not_absolute",
            Some(dir.display().to_string()),
        ));
    }
    if !dir.is_dir() {
        return Err(ConfigError::invalid(
            "destinations",
            "not_a_directory",
            Some(dir.display().to_string()),
        ));
    }
    Ok(())
}
