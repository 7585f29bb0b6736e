//! Splitting approved content into the files it publishes.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{InfraError, Result};

/// Relative path → file content, in path order.
pub type ArtifactFiles = BTreeMap<String, String>;

fn file_block() -> &'static Regex {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    BLOCK.get_or_init(|| {
        Regex::new(r"(?s)FILENAME:[ \t]*([^\r\n]+?)[ \t]*\r?\n```[\w.+-]*[ \t]*\r?\n(.*?)```")
            .expect("file block pattern is valid")
    })
}

/// Whether `content` carries at least one `FILENAME:` + fenced block.
pub fn has_file_blocks(content: &str) -> bool {
    file_block().is_match(content)
}

/// Reject paths that could escape the project root.
pub fn check_relative_path(path: &str) -> Result<()> {
    let p = Path::new(path);
    let escapes = path.trim().is_empty()
        || path.starts_with('\\')
        || path.contains(":\\")
        || p.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(InfraError::InvalidArtifactPath(path.to_string()));
    }
    Ok(())
}

/// Split `FILENAME: <path>` + fenced block sections into a file map.
///
/// Content with no such sections maps whole onto `default_path`. A later
/// block for the same path replaces an earlier one.
pub fn split_artifact_files(content: &str, default_path: &str) -> Result<ArtifactFiles> {
    let mut files = ArtifactFiles::new();
    for caps in file_block().captures_iter(content) {
        let path = caps[1].trim().trim_matches('`').to_string();
        check_relative_path(&path)?;
        let body = caps[2].trim_end_matches(['\r', '\n']).to_string();
        files.insert(path, format!("{body}\n"));
    }

    if files.is_empty() {
        check_relative_path(default_path)?;
        let mut body = content.trim_end().to_string();
        body.push('\n');
        files.insert(default_path.to_string(), body);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_content_goes_to_default_path() {
        let files = split_artifact_files("FROM alpine:3.19", "Dockerfile").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files["Dockerfile"], "FROM alpine:3.19\n");
    }

    #[test]
    fn test_multiple_file_blocks() {
        let content = "FILENAME: monitoring/Chart.yaml\n```yaml\napiVersion: v2\nname: obs\n```\n\
                       FILENAME: monitoring/values.yaml\n```\nreplicas: 1\n```\n";
        let files = split_artifact_files(content, "unused").unwrap();
        let paths: Vec<_> = files.keys().cloned().collect();
        assert_eq!(paths, vec!["monitoring/Chart.yaml", "monitoring/values.yaml"]);
        assert_eq!(files["monitoring/Chart.yaml"], "apiVersion: v2\nname: obs\n");
    }

    #[test]
    fn test_escaping_paths_are_rejected() {
        for bad in ["/etc/passwd", "../outside.yml", "k8s/../../x", "C:\\temp\\x"] {
            let content = format!("FILENAME: {bad}\n```\nx\n```");
            let err = split_artifact_files(&content, "Dockerfile").unwrap_err();
            assert!(matches!(err, InfraError::InvalidArtifactPath(_)), "{bad}");
        }
    }
}
