use crate::app::matcher::PathFilter;
use crate::app::models::MissingVars;
use crate::app::placeholder::{missing_vars, Environment, ProcessEnv};
use ignore::{DirEntry, WalkBuilder};
use pathdiff::diff_paths;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("root path cannot be empty")]
    EmptyRoot,

    #[error("error walking directory tree {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing environment variables: {0}")]
    MissingVars(MissingVars),
}

impl MissingVars {
    /// Turns a non-empty result into `ScanError::MissingVars`.
    pub fn into_result(self) -> Result<(), ScanError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ScanError::MissingVars(self))
        }
    }
}

/// Pre-flight check for placeholders that can never resolve.
pub struct Scanner {
    root: PathBuf,
    filter: Arc<PathFilter>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, filter: PathFilter) -> Result<Self, ScanError> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(ScanError::EmptyRoot);
        }
        Ok(Self {
            root,
            filter: Arc::new(filter),
        })
    }

    /// Walks the tree and collects every name that is referenced without a
    /// default and absent from `env`.
    ///
    /// Unreadable entries below the root contribute nothing; an inaccessible
    /// root is an error.
    pub fn scan<E: Environment + ?Sized>(&self, env: &E) -> Result<MissingVars, ScanError> {
        let walk_err = |source| ScanError::Walk {
            path: self.root.clone(),
            source,
        };
        let metadata = fs::metadata(&self.root).map_err(walk_err)?;
        if metadata.is_dir() {
            fs::read_dir(&self.root).map_err(walk_err)?;
        }

        let root = self.root.clone();
        let filter = Arc::clone(&self.filter);

        // Standard filters off: hidden and gitignored files are served too.
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| keep_directory(&root, &filter, entry))
            .build();

        let mut missing = MissingVars::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry
                .file_type()
                .is_some_and(|t| t.is_file() || t.is_symlink())
            {
                continue;
            }

            let relative = relative_path(&self.root, entry.path());
            if !self.filter.selects_file(&relative) {
                continue;
            }

            let data = match fs::read(entry.path()) {
                Ok(data) => data,
                Err(err) => {
                    log::debug!("Skipping {}: {}", relative, err);
                    continue;
                }
            };
            for name in missing_vars(&data, env) {
                log::debug!("{} references unset variable {}", relative, name);
                missing.insert(name);
            }
        }

        Ok(missing)
    }
}

fn keep_directory(root: &Path, filter: &PathFilter, entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
        return true;
    }
    let relative = relative_path(root, entry.path());
    let keep = filter.descends_into(&relative);
    if !keep {
        log::debug!("Skipping directory {}", relative);
    }
    keep
}

/// `path` relative to `root` with `/` separators. A root that is itself a
/// file is named by its file name.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    parts.join("/")
}

/// Scans `root` against the process environment using comma-separated
/// include/exclude pattern lists.
pub fn scan(root: &Path, include: &str, exclude: &str) -> Result<MissingVars, ScanError> {
    Scanner::new(root, PathFilter::from_specs(include, exclude))?.scan(&ProcessEnv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn scan_with(root: &Path, include: &str, exclude: &str, env: &HashMap<String, String>) -> MissingVars {
        Scanner::new(root, PathFilter::from_specs(include, exclude))
            .unwrap()
            .scan(env)
            .unwrap()
    }

    fn assert_vars(found: &MissingVars, expected: &[&str], absent: &[&str]) {
        for name in expected {
            assert!(found.contains(name), "expected {} in [{}]", name, found);
        }
        for name in absent {
            assert!(!found.contains(name), "did not expect {} in [{}]", name, found);
        }
    }

    #[test]
    fn test_reports_unset_without_default() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "file1.txt", "Hello ${FOO}");
        write(dir.path(), "file2.txt", "World ${BAR:=default}");

        let mut env = HashMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        assert!(scan_with(dir.path(), "", "", &env).is_empty());

        let found = scan_with(dir.path(), "", "", &HashMap::new());
        assert_eq!(found.iter().collect::<Vec<_>>(), vec!["FOO"]);
        let err = found.into_result().unwrap_err();
        assert_eq!(err.to_string(), "missing environment variables: FOO");
    }

    #[test]
    fn test_empty_value_counts_as_set() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "${EMPTY} ${EMPTY}");
        let mut env = HashMap::new();
        env.insert("EMPTY".to_string(), String::new());
        assert!(scan_with(dir.path(), "", "", &env).is_empty());
    }

    #[test]
    fn test_include_and_exclude_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "include-me/file1.txt", "Content with ${MISSING_VAR}");
        write(dir.path(), "exclude-me/file2.txt", "Content with ${ANOTHER_MISSING_VAR}");
        write(dir.path(), "nested/deep/file3.txt", "Content with ${THIRD_MISSING_VAR}");
        write(dir.path(), "file4.txt", "Content with ${ROOT_MISSING_VAR}");
        let env = HashMap::new();

        let found = scan_with(dir.path(), "include-me", "", &env);
        assert_vars(&found, &["MISSING_VAR"], &["ANOTHER_MISSING_VAR", "ROOT_MISSING_VAR"]);

        let found = scan_with(dir.path(), "", "exclude-me", &env);
        assert_vars(
            &found,
            &["MISSING_VAR", "THIRD_MISSING_VAR", "ROOT_MISSING_VAR"],
            &["ANOTHER_MISSING_VAR"],
        );

        let found = scan_with(dir.path(), "include-me,nested", "", &env);
        assert_vars(
            &found,
            &["MISSING_VAR", "THIRD_MISSING_VAR"],
            &["ANOTHER_MISSING_VAR", "ROOT_MISSING_VAR"],
        );

        let found = scan_with(dir.path(), "", "exclude-me,nested", &env);
        assert_vars(
            &found,
            &["MISSING_VAR", "ROOT_MISSING_VAR"],
            &["ANOTHER_MISSING_VAR", "THIRD_MISSING_VAR"],
        );

        let found = scan_with(dir.path(), "include-me,exclude-me", "exclude-me", &env);
        assert_vars(&found, &["MISSING_VAR"], &["ANOTHER_MISSING_VAR"]);
    }

    #[test]
    fn test_glob_patterns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "test-unit/file1.txt", "${TEST_UNIT_VAR}");
        write(dir.path(), "test-integration/file2.txt", "${TEST_INTEGRATION_VAR}");
        write(dir.path(), "backup-2023/file3.txt", "${BACKUP_VAR}");
        write(dir.path(), "config.tmp/file4.txt", "${CONFIG_TMP_VAR}");
        write(dir.path(), "src/file5.txt", "${SRC_VAR}");
        let env = HashMap::new();

        let found = scan_with(dir.path(), "test-*", "", &env);
        assert_vars(
            &found,
            &["TEST_UNIT_VAR", "TEST_INTEGRATION_VAR"],
            &["BACKUP_VAR", "SRC_VAR", "CONFIG_TMP_VAR"],
        );

        let found = scan_with(dir.path(), "", "test-*", &env);
        assert_vars(
            &found,
            &["BACKUP_VAR", "SRC_VAR", "CONFIG_TMP_VAR"],
            &["TEST_UNIT_VAR", "TEST_INTEGRATION_VAR"],
        );

        let found = scan_with(dir.path(), "*.tmp", "", &env);
        assert_vars(&found, &["CONFIG_TMP_VAR"], &["TEST_UNIT_VAR", "BACKUP_VAR", "SRC_VAR"]);

        let found = scan_with(dir.path(), "src,backup-*", "", &env);
        assert_vars(
            &found,
            &["SRC_VAR", "BACKUP_VAR"],
            &["TEST_UNIT_VAR", "CONFIG_TMP_VAR"],
        );
    }

    fn readme_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let dirs = [
            "src", "public", "node_modules", "vendor", "test-unit", "test-integration",
            "old-backup", "config.tmp", "cache-1", "cache-2", "docs/v1", "docs/v2",
            "docs/v1-draft",
        ];
        for name in dirs {
            let var = name.replace(['/', '-', '.'], "_").to_uppercase() + "_VAR";
            write(dir.path(), &format!("{}/test.html", name), &format!("Content with ${{{}}}", var));
        }
        dir
    }

    #[test]
    fn test_readme_scenarios() {
        let dir = readme_tree();
        let env = HashMap::new();
        let cases: &[(&str, &str, &[&str], &[&str])] = &[
            ("src,public", "", &["SRC_VAR", "PUBLIC_VAR"], &["NODE_MODULES_VAR", "VENDOR_VAR", "TEST_UNIT_VAR"]),
            ("", "node_modules,vendor", &["SRC_VAR", "PUBLIC_VAR", "TEST_UNIT_VAR"], &["NODE_MODULES_VAR", "VENDOR_VAR"]),
            ("", "test-*", &["SRC_VAR", "PUBLIC_VAR", "NODE_MODULES_VAR"], &["TEST_UNIT_VAR", "TEST_INTEGRATION_VAR"]),
            ("", "*-backup", &["SRC_VAR", "PUBLIC_VAR", "TEST_UNIT_VAR"], &["OLD_BACKUP_VAR"]),
            ("cache-?", "", &["CACHE_1_VAR", "CACHE_2_VAR"], &["SRC_VAR", "PUBLIC_VAR", "TEST_UNIT_VAR"]),
            ("docs/v*", "", &["DOCS_V1_VAR", "DOCS_V2_VAR", "DOCS_V1_DRAFT_VAR"], &["SRC_VAR", "PUBLIC_VAR"]),
            ("src,docs/v*", "docs/v1-*", &["SRC_VAR", "DOCS_V1_VAR", "DOCS_V2_VAR"], &["DOCS_V1_DRAFT_VAR", "PUBLIC_VAR"]),
        ];
        for (include, exclude, expected, absent) in cases {
            let found = scan_with(dir.path(), include, exclude, &env);
            assert_vars(&found, expected, absent);
        }
    }

    #[test]
    fn test_file_patterns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "public/test.html", "${PUBLIC_VAR}");
        write(dir.path(), "src/test.html", "${SRC_VAR}");
        write(dir.path(), "src/script.js", "${JS_VAR}");
        write(dir.path(), "public/style.css", "${CSS_VAR}");
        write(dir.path(), "config.txt", "${CONFIG_VAR}");
        let env = HashMap::new();

        let cases: &[(&str, &str, &[&str], &[&str])] = &[
            ("*.html", "", &["PUBLIC_VAR", "SRC_VAR"], &["JS_VAR", "CSS_VAR", "CONFIG_VAR"]),
            ("*.js", "", &["JS_VAR"], &["PUBLIC_VAR", "SRC_VAR", "CSS_VAR", "CONFIG_VAR"]),
            ("config.txt", "", &["CONFIG_VAR"], &["PUBLIC_VAR", "SRC_VAR", "JS_VAR", "CSS_VAR"]),
            ("src/*.js", "", &["JS_VAR"], &["PUBLIC_VAR", "SRC_VAR", "CSS_VAR", "CONFIG_VAR"]),
            ("", "*.html", &["JS_VAR", "CSS_VAR", "CONFIG_VAR"], &["PUBLIC_VAR", "SRC_VAR"]),
            ("", "config.txt", &["PUBLIC_VAR", "SRC_VAR", "JS_VAR", "CSS_VAR"], &["CONFIG_VAR"]),
            ("*.css,*.js", "", &["JS_VAR", "CSS_VAR"], &["PUBLIC_VAR", "SRC_VAR", "CONFIG_VAR"]),
        ];
        for (include, exclude, expected, absent) in cases {
            let found = scan_with(dir.path(), include, exclude, &env);
            assert_vars(&found, expected, absent);
        }
    }

    #[test]
    fn test_hidden_files_are_scanned() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".well-known/config.json", "${HIDDEN_VAR}");
        write(dir.path(), ".gitignore", "*.json\n");
        let found = scan_with(dir.path(), "", "", &HashMap::new());
        assert!(found.contains("HIDDEN_VAR"));
    }

    #[test]
    fn test_root_errors() {
        let err = Scanner::new("", PathFilter::default()).err().unwrap();
        assert!(matches!(err, ScanError::EmptyRoot));
        assert_eq!(err.to_string(), "root path cannot be empty");

        let dir = TempDir::new().unwrap();
        let err = scan(&dir.path().join("nonexistent"), "", "").unwrap_err();
        assert!(matches!(err, ScanError::Walk { .. }));
    }

    #[test]
    fn test_root_can_be_a_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "tempfile.txt", "content with ${MISSING_VAR}");
        let found = scan_with(&dir.path().join("tempfile.txt"), "", "", &HashMap::new());
        assert!(found.contains("MISSING_VAR"));
    }
}
