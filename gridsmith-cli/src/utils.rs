use std::path::{Path, PathBuf};

use gridsmith_exec::OrchestratorConfig;

use crate::output::print_error;
use crate::OutputArgs;

/// Extensions picked up when a directory is passed to `build`.
const CHUNK_EXTENSIONS: &[&str] = &["js", "ts"];

pub fn read_source(path: &Path, output: &OutputArgs) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(v) => Some(v),
        Err(e) => {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to read {}: {e}", path.display()),
            );
            None
        }
    }
}

/// Loads an orchestrator config; `.yaml`/`.yml` are read as YAML, anything
/// else as JSON with a YAML fallback.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if is_yaml {
        return serde_yaml::from_str(&content).map_err(|e| format!("invalid config {}: {e}", path.display()));
    }
    match serde_json::from_str(&content) {
        Ok(v) => Ok(v),
        Err(json_err) => serde_yaml::from_str(&content)
            .map_err(|_| format!("invalid config {}: {json_err}", path.display())),
    }
}

/// Expands directories into their script files and orders everything by
/// file name.
pub fn collect_chunk_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries =
                std::fs::read_dir(path).map_err(|e| format!("failed to list {}: {e}", path.display()))?;
            for entry in entries {
                let entry = entry.map_err(|e| format!("failed to list {}: {e}", path.display()))?;
                let file = entry.path();
                if file.is_file() && has_chunk_extension(&file) {
                    files.push(file);
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(format!("no such file or directory: {}", path.display()));
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn has_chunk_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| CHUNK_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Chunk id derived from a file name: `02-totals.js` becomes `02-totals`.
pub fn chunk_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_drops_extension() {
        assert_eq!(chunk_id(Path::new("chunks/02-totals.js")), "02-totals");
    }

    #[test]
    fn only_scripts_count_as_chunks() {
        assert!(has_chunk_extension(Path::new("a.JS")));
        assert!(!has_chunk_extension(Path::new("notes.md")));
    }
}
