//! Names never snapshotted below a root: version control metadata and
//! editor droppings.

use std::collections::BTreeSet;

/// The patterns excluded when nothing else is configured.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/%*%",
    "**/.#*",
    "**/._*",
    "**/#*#",
    "**/*~",
    "**/.DS_Store",
    "**/CVS",
    "**/CVS/**",
    "**/.cvsignore",
    "**/SCCS",
    "**/SCCS/**",
    "**/vssver.scc",
    "**/.svn",
    "**/.svn/**",
    "**/.git",
    "**/.git/**",
    "**/.gitattributes",
    "**/.gitignore",
    "**/.gitmodules",
    "**/.hg",
    "**/.hg/**",
    "**/.hgignore",
    "**/.hgsub",
    "**/.hgsubstate",
    "**/.hgtags",
    "**/.bzr",
    "**/.bzr/**",
    "**/.bzrignore",
];

/// Name based excludes applied while walking a directory.
///
/// Every pattern matches a single file name at any depth. A pattern ending
/// in `/**` excludes directories of that name, a pattern without `*`
/// excludes files of that name, and a pattern with one `*` excludes files
/// whose name starts with the text before it and ends with the text after
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultExcludes {
    patterns: Vec<String>,
    directory_names: BTreeSet<String>,
    file_names: BTreeSet<String>,
    /// Prefix and suffix around the wildcard
    name_matchers: Vec<(String, String)>,
}

impl DefaultExcludes {
    /// Parse `patterns` into name matchers.
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut excludes = Self {
            patterns: Vec::new(),
            directory_names: BTreeSet::new(),
            file_names: BTreeSet::new(),
            name_matchers: Vec::new(),
        };
        for pattern in patterns {
            excludes.add(pattern.into());
        }
        excludes
    }

    /// Exclude nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Vec::<String>::new())
    }

    fn add(&mut self, pattern: String) {
        let name = pattern.strip_prefix("**/").unwrap_or(&pattern);
        if let Some(directory) = name.strip_suffix("/**") {
            let _ = self.directory_names.insert(directory.to_string());
        } else if let Some(star) = name.find('*') {
            let prefix = name[..star].to_string();
            let suffix = name[star + 1..].to_string();
            self.name_matchers.push((prefix, suffix));
        } else {
            let _ = self.file_names.insert(name.to_string());
        }
        self.patterns.push(pattern);
    }

    /// The patterns as configured
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a directory called `name` is skipped with everything in it.
    #[must_use]
    pub fn exclude_directory(&self, name: &str) -> bool {
        self.directory_names.contains(name)
    }

    /// Whether a file called `name` is skipped.
    #[must_use]
    pub fn exclude_file(&self, name: &str) -> bool {
        self.file_names.contains(name)
            || self.name_matchers.iter().any(|(prefix, suffix)| {
                name.starts_with(prefix.as_str()) && name.ends_with(suffix.as_str())
            })
    }

    /// Stable description of the patterns, for configuration hashing.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("default-excludes[{}]", self.patterns.join(","))
    }
}

impl Default for DefaultExcludes {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDES.iter().copied())
    }
}
