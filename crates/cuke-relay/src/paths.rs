//! Path helpers and expansion of step-definition patterns.
//!
//! Patterns may contain one of two placeholders:
//!
//! - `[filepath]` - the feature's path relative to the integration folder,
//!   without its `.feature` extension
//! - `[filepart]` - every ancestor of that path, down to the integration
//!   folder itself
//!
//! Globbing the expanded patterns is left to the caller.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::config::Configuration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Expected an absolute path for implicit integration folder but got {0}")]
    RelativeIntegrationFolder(String),

    #[error("Expected an absolute path for spec but got {0}")]
    RelativeSpec(String),

    #[error("Expected a relative path but got {0}")]
    AbsolutePart(String),

    #[error("Pattern cannot contain both [filepath] and [filepart], but got {0:?}")]
    BothPlaceholders(String),
}

/// `path` joined onto `root` unless it is already absolute.
pub fn ensure_is_absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// `path` relative to `root` if it is absolute, otherwise unchanged.
pub fn ensure_is_relative(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        relative(root, path)
    } else {
        path.to_path_buf()
    }
}

/// Lexical path from `from` to `to`, using `..` where needed.
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().filter(|c| *c != Component::CurDir).collect();
    let to: Vec<Component<'_>> = to.components().filter(|c| *c != Component::CurDir).collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for component in &to[common..] {
        result.push(component.as_os_str());
    }
    result
}

/// Forward slashes regardless of platform.
pub fn to_posix(location: &str) -> String {
    if std::path::MAIN_SEPARATOR == '\\' {
        location.replace('\\', "/")
    } else {
        location.to_string()
    }
}

/// Escape glob magic so `text` only matches itself.
pub fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(character, '*' | '?' | '[' | ']' | '(' | ')' | '{' | '}') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

/// Lexically normalize a slash-separated path: drop `.` segments and fold
/// `..` into its parent.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// `foo/bar/baz` becomes `[foo/bar/baz, foo/bar, foo]`.
pub fn path_parts(relative_path: &str) -> Result<Vec<String>, PathError> {
    if relative_path.starts_with('/') {
        return Err(PathError::AbsolutePart(relative_path.to_string()));
    }

    let mut parts = Vec::new();
    let mut current = normalize(relative_path);
    while current != "." {
        let parent = normalize(&format!("{current}/.."));
        parts.push(current);
        current = parent;
    }
    Ok(parts)
}

/// Expand the configured step-definition patterns for the feature at
/// `filepath`. Both `filepath` and the integration folder must be absolute.
pub fn step_definition_patterns(
    configuration: &Configuration,
    filepath: &Path,
) -> Result<Vec<String>, PathError> {
    let integration = &configuration.implicit_integration_folder;
    if !integration.is_absolute() {
        return Err(PathError::RelativeIntegrationFolder(
            integration.display().to_string(),
        ));
    }
    if !filepath.is_absolute() {
        return Err(PathError::RelativeSpec(filepath.display().to_string()));
    }

    let relative_feature = to_posix(&relative(integration, filepath).to_string_lossy());
    let trimmed = relative_feature
        .strip_suffix(".feature")
        .unwrap_or(&relative_feature);
    let replacement = escape_glob(trimmed);
    debug!(filepath = %replacement, "replacing [filepath]");

    let parts = path_parts(&replacement)?;
    debug!(?parts, "replacing [filepart]");

    let mut patterns = Vec::new();
    for pattern in &configuration.step_definitions {
        let has_filepath = pattern.contains("[filepath]");
        let has_filepart = pattern.contains("[filepart]");
        match (has_filepath, has_filepart) {
            (true, true) => return Err(PathError::BothPlaceholders(pattern.clone())),
            (true, false) => patterns.push(pattern.replacen("[filepath]", &replacement, 1)),
            (false, true) => {
                patterns.extend(parts.iter().map(|part| pattern.replacen("[filepart]", part, 1)));
                patterns.push(normalize(&pattern.replacen("[filepart]", ".", 1)));
            }
            (false, false) => patterns.push(pattern.clone()),
        }
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{combine, EnvironmentOverrides, RuntimeContext, UserConfiguration};

    fn configuration(
        project_root: &str,
        integration: &str,
        step_definitions: Option<&str>,
    ) -> Configuration {
        let user = UserConfiguration {
            base: crate::config::BaseConfiguration {
                step_definitions: step_definitions.map(|pattern| vec![pattern.to_string()]),
                ..Default::default()
            },
            ..Default::default()
        };
        combine(
            &user,
            &EnvironmentOverrides::default(),
            &RuntimeContext {
                project_root: PathBuf::from(project_root),
                implicit_integration_folder: PathBuf::from(integration),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_path_parts() {
        assert_eq!(path_parts("foo/bar/baz").unwrap(), vec!["foo/bar/baz", "foo/bar", "foo"]);
        assert!(matches!(path_parts("/foo"), Err(PathError::AbsolutePart(_))));
    }

    #[test]
    fn test_default_patterns() {
        let configuration = configuration("/foo/bar", "/foo/bar/tests/features", None);
        let patterns = step_definition_patterns(
            &configuration,
            Path::new("/foo/bar/tests/features/baz.feature"),
        )
        .unwrap();
        assert_eq!(
            patterns,
            vec![
                "tests/features/baz/**/*.rs",
                "tests/features/baz.rs",
                "tests/support/step_definitions/**/*.rs",
            ]
        );
    }

    #[test]
    fn test_filepath_placeholder() {
        let configuration = configuration(
            "/",
            "/tests/features",
            Some("tests/features/[filepath]/steps/*.rs"),
        );
        let patterns = step_definition_patterns(
            &configuration,
            Path::new("/tests/features/foo/bar/baz.feature"),
        )
        .unwrap();
        assert_eq!(patterns, vec!["tests/features/foo/bar/baz/steps/*.rs"]);
    }

    #[test]
    fn test_filepart_placeholder() {
        let configuration = configuration(
            "/",
            "/tests/features",
            Some("tests/features/[filepart]/steps/*.rs"),
        );
        let patterns = step_definition_patterns(
            &configuration,
            Path::new("/tests/features/foo/bar/baz.feature"),
        )
        .unwrap();
        assert_eq!(
            patterns,
            vec![
                "tests/features/foo/bar/baz/steps/*.rs",
                "tests/features/foo/bar/steps/*.rs",
                "tests/features/foo/steps/*.rs",
                "tests/features/steps/*.rs",
            ]
        );
    }

    #[test]
    fn test_glob_magic_in_feature_names_is_escaped() {
        let configuration = configuration("/", "/features", Some("steps/[filepath].rs"));
        let patterns =
            step_definition_patterns(&configuration, Path::new("/features/a (1).feature")).unwrap();
        assert_eq!(patterns, vec![r"steps/a \(1\).rs"]);
    }

    #[test]
    fn test_both_placeholders_is_an_error() {
        let configuration = configuration("/", "/features", Some("[filepath]/[filepart]/*.rs"));
        let err =
            step_definition_patterns(&configuration, Path::new("/features/a.feature")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Pattern cannot contain both [filepath] and [filepart], but got \"[filepath]/[filepart]/*.rs\""
        );
    }

    #[test]
    fn test_relative_inputs_are_rejected() {
        let configuration = configuration("/", "features", None);
        assert!(matches!(
            step_definition_patterns(&configuration, Path::new("/features/a.feature")),
            Err(PathError::RelativeIntegrationFolder(_))
        ));
    }

    #[test]
    fn test_relative_and_absolute() {
        assert_eq!(relative(Path::new("/a/b"), Path::new("/a/c/d")), PathBuf::from("../c/d"));
        assert_eq!(
            ensure_is_relative(Path::new("/project"), Path::new("/project/tests")),
            PathBuf::from("tests")
        );
        assert_eq!(
            ensure_is_absolute(Path::new("/project"), Path::new("out.ndjson")),
            PathBuf::from("/project/out.ndjson")
        );
        assert_eq!(normalize("a/./b/../c"), "a/c");
        assert_eq!(normalize("./x"), "x");
    }
}
