//! Project metadata used to name the distribution archive.
//!
//! A source distribution is named `<name>-<version>.tar.gz`. The name and
//! version come from explicit overrides first, then from the `[project]`
//! table of `pyproject.toml`. Missing values are not an error: the archive
//! locator falls back to discovery.

use camino::Utf8Path;
use log::{debug, trace};

/// Name and version of the project being verified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetadata {
    /// Distribution name, e.g. `nighres`.
    pub name: Option<String>,
    /// Distribution version, e.g. `1.0`.
    pub version: Option<String>,
}

impl ProjectMetadata {
    /// Create metadata from known values.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: Some(version.into()),
        }
    }

    /// Resolve metadata for the project rooted at `project_dir`.
    ///
    /// Values in `overrides` win; gaps are filled from `pyproject.toml`.
    #[must_use]
    pub fn resolve(project_dir: &Utf8Path, overrides: &Self) -> Self {
        let discovered = if overrides.is_complete() {
            Self::default()
        } else {
            read_pyproject(project_dir)
        };
        Self {
            name: overrides.name.clone().or(discovered.name),
            version: overrides.version.clone().or(discovered.version),
        }
    }

    /// Whether both name and version are known.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.name.is_some() && self.version.is_some()
    }

    /// Candidate archive file names, most specific first.
    ///
    /// Older packaging tools keep the name verbatim; newer ones normalise it
    /// by lowercasing and folding runs of `-`, `_` and `.` into `_`. Returns
    /// an empty list when the metadata is incomplete.
    #[must_use]
    pub fn archive_file_names(&self) -> Vec<String> {
        let (Some(name), Some(version)) = (&self.name, &self.version) else {
            return Vec::new();
        };
        let verbatim = format!("{name}-{version}.tar.gz");
        let normalised = format!("{}-{version}.tar.gz", normalise_name(name));
        if normalised == verbatim {
            vec![verbatim]
        } else {
            vec![verbatim, normalised]
        }
    }
}

/// Normalise a distribution name the way modern sdist filenames do.
#[must_use]
pub fn normalise_name(name: &str) -> String {
    let mut normalised = String::with_capacity(name.len());
    let mut in_separator_run = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator_run {
                normalised.push('_');
            }
            in_separator_run = true;
        } else {
            normalised.extend(c.to_lowercase());
            in_separator_run = false;
        }
    }
    normalised
}

fn read_pyproject(project_dir: &Utf8Path) -> ProjectMetadata {
    let path = project_dir.join("pyproject.toml");
    let Ok(content) = std::fs::read_to_string(&path) else {
        trace!("no readable pyproject.toml at {path}");
        return ProjectMetadata::default();
    };

    let Ok(manifest) = content.parse::<toml::Table>() else {
        debug!("ignoring unparsable {path}");
        return ProjectMetadata::default();
    };

    let project = manifest.get("project");
    let field = |key: &str| {
        project
            .and_then(|p| p.get(key))
            .and_then(toml::Value::as_str)
            .map(str::to_owned)
    };

    ProjectMetadata {
        name: field("name"),
        version: field("version"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    fn project_with_pyproject(contents: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf-8 temp dir");
        std::fs::write(path.join("pyproject.toml"), contents).expect("write pyproject");
        (dir, path)
    }

    #[test]
    fn reads_name_and_version_from_pyproject() {
        let (_dir, path) =
            project_with_pyproject("[project]\nname = \"nighres\"\nversion = \"1.0\"\n");
        let metadata = ProjectMetadata::resolve(&path, &ProjectMetadata::default());
        assert_eq!(metadata, ProjectMetadata::new("nighres", "1.0"));
    }

    #[test]
    fn overrides_take_precedence() {
        let (_dir, path) =
            project_with_pyproject("[project]\nname = \"nighres\"\nversion = \"1.0\"\n");
        let overrides = ProjectMetadata {
            name: None,
            version: Some("2.0".to_owned()),
        };
        let metadata = ProjectMetadata::resolve(&path, &overrides);
        assert_eq!(metadata, ProjectMetadata::new("nighres", "2.0"));
    }

    #[test]
    fn dynamic_version_leaves_gap() {
        let (_dir, path) = project_with_pyproject(
            "[project]\nname = \"nighres\"\ndynamic = [\"version\"]\n",
        );
        let metadata = ProjectMetadata::resolve(&path, &ProjectMetadata::default());
        assert!(!metadata.is_complete());
        assert!(metadata.archive_file_names().is_empty());
    }

    #[test]
    fn missing_pyproject_yields_empty_metadata() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let metadata = ProjectMetadata::resolve(&path, &ProjectMetadata::default());
        assert_eq!(metadata, ProjectMetadata::default());
    }

    #[rstest]
    #[case::plain("nighres", "nighres")]
    #[case::mixed_case("NigHres", "nighres")]
    #[case::separator_run("my-.pkg__name", "my_pkg_name")]
    fn normalise_name_variants(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(normalise_name(name), expected);
    }

    #[test]
    fn archive_names_include_normalised_variant() {
        let metadata = ProjectMetadata::new("My-Package", "0.3");
        assert_eq!(
            metadata.archive_file_names(),
            vec!["My-Package-0.3.tar.gz", "my_package-0.3.tar.gz"]
        );
    }
}
