use globset::{GlobBuilder, GlobMatcher};

/// Extensions that make a bare `*.ext` pattern select files instead of
/// directories.
const TEXT_EXTENSIONS: &[&str] = &[
    "html", "js", "css", "json", "txt", "md", "xml", "yml", "yaml", "log", "bak",
];

/// Converts platform separators to `/`.
pub fn normalize(path: &str) -> String {
    let path = path.trim();
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// `dirname` with `.` for a bare name.
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Splits a comma-separated pattern list, dropping empty entries.
pub fn parse_patterns(spec: &str) -> Vec<String> {
    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    is_glob: bool,
    glob: Option<GlobMatcher>,
}

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        let raw = normalize(pattern);
        let is_glob = raw.contains(['*', '?', '[']);
        let glob = if is_glob {
            match GlobBuilder::new(&raw)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
            {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(err) => {
                    log::warn!("Invalid glob pattern {:?}: {}", raw, err);
                    None
                }
            }
        } else {
            None
        };
        Self { raw, is_glob, glob }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_glob(&self) -> bool {
        self.is_glob
    }

    fn glob_matches(&self, candidate: &str) -> bool {
        self.glob
            .as_ref()
            .is_some_and(|glob| glob.is_match(candidate))
    }

    /// Whether `path` is selected by this pattern.
    ///
    /// `for_include` adds the traversal allowance: ancestors of a deeper
    /// target also match, so a walk can descend towards it.
    pub fn matches(&self, path: &str, for_include: bool) -> bool {
        let path = normalize(path);
        let pattern = self.raw.as_str();

        if path == pattern {
            return true;
        }
        if pattern.is_empty() {
            return false;
        }

        if self.is_glob {
            if self.glob_matches(&path) {
                return true;
            }

            if pattern.contains('/') {
                if self.glob_matches(parent_dir(&path)) {
                    return true;
                }
                if for_include {
                    let pattern_dir = parent_dir(pattern);
                    if pattern_dir != "."
                        && (path == pattern_dir
                            || is_under(&path, pattern_dir)
                            || is_under(pattern_dir, &path))
                    {
                        return true;
                    }
                }
                return false;
            }

            if path.split('/').any(|part| self.glob_matches(part)) {
                return true;
            }
            return ancestor_prefixes(&path).any(|prefix| self.glob_matches(prefix));
        }

        if is_under(&path, pattern) {
            return true;
        }
        if for_include && is_under(pattern, &path) {
            return true;
        }
        path.split('/').any(|part| part == pattern)
    }

    /// `*.ext` for a text-like extension, or a path glob naming a file such
    /// as `src/*.js`.
    pub fn is_file_pattern(&self) -> bool {
        let pattern = self.raw.as_str();
        if let Some(ext) = pattern.strip_prefix("*.") {
            if !pattern.contains('/') {
                return TEXT_EXTENSIONS.contains(&ext);
            }
        }
        pattern.contains('/') && pattern.contains('*') && pattern.contains('.')
    }

    /// Matches a file pattern against a file's base name (`*.ext`) or its
    /// full relative path.
    pub fn matches_file(&self, file_path: &str) -> bool {
        let file_path = normalize(file_path);
        if self.raw.contains('/') {
            self.glob_matches(&file_path)
        } else {
            self.glob_matches(base_name(&file_path))
        }
    }
}

/// `child` is a strict sub-path of `parent`.
fn is_under(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// `a`, `a/b`, `a/b/c` for `a/b/c`.
fn ancestor_prefixes(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(idx, _)| &path[..idx])
        .chain(std::iter::once(path))
}

/// Exclude-wins selection of `path` against two pattern lists.
///
/// Directories get the traversal allowance; files do not, and file patterns
/// are matched against the file itself rather than its directory.
pub fn selects(path: &str, include: &[Pattern], exclude: &[Pattern], is_file: bool) -> bool {
    if exclude.iter().any(|pattern| pattern.matches(path, false)) {
        return false;
    }
    if include.is_empty() {
        return true;
    }
    include.iter().any(|pattern| {
        if !is_file {
            pattern.matches(path, true)
        } else if pattern.is_file_pattern() {
            pattern.matches_file(path)
        } else {
            pattern.matches(path, false)
        }
    })
}

/// Parsed include/exclude configuration used to prune and select paths.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    has_file_patterns: bool,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        let include: Vec<Pattern> = include.iter().map(|p| Pattern::new(p.as_ref())).collect();
        let exclude = exclude.iter().map(|p| Pattern::new(p.as_ref())).collect();
        let has_file_patterns = include.iter().any(Pattern::is_file_pattern);
        Self {
            include,
            exclude,
            has_file_patterns,
        }
    }

    /// Builds a filter from comma-separated pattern strings.
    pub fn from_specs(include: &str, exclude: &str) -> Self {
        let include = parse_patterns(include);
        let exclude = parse_patterns(exclude);
        Self::new(include.as_slice(), exclude.as_slice())
    }

    pub fn include(&self) -> &[Pattern] {
        &self.include
    }

    pub fn exclude(&self) -> &[Pattern] {
        &self.exclude
    }

    pub fn selects_file(&self, path: &str) -> bool {
        selects(path, &self.include, &self.exclude, true)
    }

    /// Whether a walk should descend into directory `path`.
    ///
    /// File patterns can select files at any depth, so when one is present
    /// only the exclude list prunes.
    pub fn descends_into(&self, path: &str) -> bool {
        if self.has_file_patterns {
            selects(path, &[], &self.exclude, false)
        } else {
            selects(path, &self.include, &self.exclude, false)
        }
    }
}
