use std::collections::HashSet;
use std::path::Path;

use glob::glob;

use crate::error::ConfigError;

/// Strip leading non-alphanumeric characters and trailing line terminators.
pub fn trim_name(line: &str) -> &str {
    line.trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches(['\r', '\n'])
}

/// Drop the final `.extension` of a file name, leaving directories alone.
pub fn strip_suffix(name: &str) -> &str {
    let file_start = name.rfind('/').map_or(0, |idx| idx + 1);
    match name[file_start..].rfind('.') {
        Some(dot) => &name[..file_start + dot],
        None => name,
    }
}

pub fn load_name_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::NameFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content
        .lines()
        .map(trim_name)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn expand_patterns(patterns: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut resolved = Vec::new();
    for pattern in patterns {
        let matches = glob(pattern).map_err(|err| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            message: err.to_string(),
        })?;
        let before = resolved.len();
        for path in matches.flatten() {
            if path.is_file() {
                resolved.push(path.to_string_lossy().into_owned());
            }
        }
        if resolved.len() == before {
            return Err(ConfigError::EmptyPattern(pattern.clone()));
        }
    }
    Ok(resolved)
}

/// Turn file names into unique roots, keeping first-seen order.
pub fn collect_roots<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| strip_suffix(name.as_ref()))
        .filter(|root| !root.is_empty())
        .filter(|root| seen.insert(root.to_string()))
        .map(str::to_string)
        .collect()
}
