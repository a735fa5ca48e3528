//! Fingerprinting strategies: snapshot roots in, fingerprint out.

use crate::fingerprint::{
    CurrentFileCollectionFingerprint, FileSystemLocationFingerprint, FingerprintBuilder,
    FingerprintHashingStrategy,
};
use crate::normalization::{DirectorySensitivity, PathNormalization};
use convenient_snapshot::{
    ContentHash, ContentHasher, DIRECTORY_SIGNATURE, DefaultExcludes, FileSystemLocationSnapshot,
    FileType, HashAlgorithm, SnapshottingFilter,
};
use std::sync::Arc;
use tracing::debug;

/// Everything that decides how snapshot roots become a fingerprint.
///
/// Two fingerprints are only comparable when they were produced by
/// strategies with the same [`configuration_hash`](Self::configuration_hash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintingStrategy {
    normalization: PathNormalization,
    hashing: FingerprintHashingStrategy,
    directory_sensitivity: DirectorySensitivity,
    filter: SnapshottingFilter,
    hash_algorithm: HashAlgorithm,
    /// Description of the snapshotter's default excludes
    default_excludes: String,
}

impl FingerprintingStrategy {
    /// Sorted strategy with the given normalization and no filter.
    #[must_use]
    pub fn new(normalization: PathNormalization) -> Self {
        Self {
            normalization,
            hashing: FingerprintHashingStrategy::Sorted,
            directory_sensitivity: DirectorySensitivity::Default,
            filter: SnapshottingFilter::default(),
            hash_algorithm: HashAlgorithm::default(),
            default_excludes: DefaultExcludes::default().describe(),
        }
    }

    /// Use `hashing` to combine entries.
    #[must_use]
    pub fn with_hashing(mut self, hashing: FingerprintHashingStrategy) -> Self {
        self.hashing = hashing;
        self
    }

    /// Use `sensitivity` for directory entries.
    #[must_use]
    pub fn with_directory_sensitivity(mut self, sensitivity: DirectorySensitivity) -> Self {
        self.directory_sensitivity = sensitivity;
        self
    }

    /// Filter every root before fingerprinting.
    #[must_use]
    pub fn with_filter(mut self, filter: SnapshottingFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Record the algorithm snapshots are hashed with.
    #[must_use]
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Record the default excludes snapshots are taken with.
    #[must_use]
    pub fn with_default_excludes(mut self, excludes: &DefaultExcludes) -> Self {
        self.default_excludes = excludes.describe();
        self
    }

    /// Path normalization
    #[must_use]
    pub fn normalization(&self) -> PathNormalization {
        self.normalization
    }

    /// Entry combination
    #[must_use]
    pub fn hashing(&self) -> FingerprintHashingStrategy {
        self.hashing
    }

    /// Stable identifier
    #[must_use]
    pub fn identifier(&self) -> &'static str {
        self.normalization.identifier()
    }

    /// Hash of every setting that affects the produced entries.
    #[must_use]
    pub fn configuration_hash(&self) -> ContentHash {
        let mut hasher = ContentHasher::new();
        hasher.put_str(self.identifier());
        hasher.put_str(match self.hashing {
            FingerprintHashingStrategy::Sorted => "sorted",
            FingerprintHashingStrategy::Ordered => "ordered",
        });
        hasher.put_str(match self.directory_sensitivity {
            DirectorySensitivity::Default => "directories",
            DirectorySensitivity::IgnoreDirectories => "files-only",
        });
        hasher.put_str(&self.filter.describe());
        hasher.put_str(self.hash_algorithm.name());
        hasher.put_str(&self.default_excludes);
        hasher.finish()
    }

    /// Fingerprint of a collection with no roots
    #[must_use]
    pub fn empty_fingerprint(&self) -> CurrentFileCollectionFingerprint {
        FingerprintBuilder::new(self).build()
    }

    /// Fingerprint `roots`, in the given order.
    ///
    /// Each root is filtered, then walked depth-first in child-name order.
    /// Every location the normalization keeps becomes one entry; directories
    /// carry the directory signature instead of their tree hash.
    #[must_use]
    pub fn fingerprint(
        &self,
        roots: &[Arc<FileSystemLocationSnapshot>],
    ) -> CurrentFileCollectionFingerprint {
        let mut builder = FingerprintBuilder::new(self);

        for root in roots {
            let root = self.filter.apply(root);
            builder.add_root(
                root.absolute_path().to_string_lossy().into_owned(),
                root.hash().clone(),
            );
            root.walk(&mut |snapshot, relative| {
                let Some(key) =
                    self.normalization
                        .normalize(snapshot, relative, self.directory_sensitivity)
                else {
                    return;
                };
                let hash = match snapshot.file_type() {
                    FileType::Directory => DIRECTORY_SIGNATURE.clone(),
                    FileType::RegularFile | FileType::Missing => snapshot.hash().clone(),
                };
                builder.push(FileSystemLocationFingerprint::new(
                    key,
                    snapshot.file_type(),
                    hash,
                    snapshot.absolute_path(),
                ));
            });
        }

        let fingerprint = builder.build();
        debug!(
            "Fingerprinted {} roots into {} entries with {}",
            roots.len(),
            fingerprint.len(),
            self.identifier()
        );
        fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> Arc<FileSystemLocationSnapshot> {
        Arc::new(FileSystemLocationSnapshot::regular_file(
            path,
            ContentHash::from_bytes(content.as_bytes()),
        ))
    }

    fn tree(root: &str) -> Arc<FileSystemLocationSnapshot> {
        let sub = Arc::new(FileSystemLocationSnapshot::directory(
            format!("{root}/sub"),
            vec![file(&format!("{root}/sub/b.txt"), "b")],
        ));
        Arc::new(FileSystemLocationSnapshot::directory(
            root,
            vec![file(&format!("{root}/a.txt"), "a"), sub],
        ))
    }

    fn keys(fp: &CurrentFileCollectionFingerprint) -> Vec<&str> {
        fp.fingerprints().iter().map(|e| e.normalized_path()).collect()
    }

    #[test]
    fn test_relative_path_entries() {
        let strategy = FingerprintingStrategy::new(PathNormalization::RelativePath);
        let fp = strategy.fingerprint(&[tree("/p")]);
        assert_eq!(keys(&fp), vec!["a.txt", "sub", "sub/b.txt"]);
        assert_eq!(fp.get("sub").unwrap().hash(), &*DIRECTORY_SIGNATURE);
    }

    #[test]
    fn test_absolute_path_includes_root() {
        let strategy = FingerprintingStrategy::new(PathNormalization::AbsolutePath);
        let fp = strategy.fingerprint(&[tree("/p")]);
        assert_eq!(keys(&fp), vec!["/p", "/p/a.txt", "/p/sub", "/p/sub/b.txt"]);
    }

    #[test]
    fn test_relocation_is_invisible_to_relative_paths() {
        let strategy = FingerprintingStrategy::new(PathNormalization::RelativePath);
        let here = strategy.fingerprint(&[tree("/here")]);
        let there = strategy.fingerprint(&[tree("/there")]);
        assert_eq!(here.hash(), there.hash());

        let absolute = FingerprintingStrategy::new(PathNormalization::AbsolutePath);
        assert_ne!(
            absolute.fingerprint(&[tree("/here")]).hash(),
            absolute.fingerprint(&[tree("/there")]).hash()
        );
    }

    #[test]
    fn test_ignore_directories() {
        let strategy = FingerprintingStrategy::new(PathNormalization::RelativePath)
            .with_directory_sensitivity(DirectorySensitivity::IgnoreDirectories);
        let fp = strategy.fingerprint(&[tree("/p")]);
        assert_eq!(keys(&fp), vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_filter_applies_and_changes_configuration() {
        let plain = FingerprintingStrategy::new(PathNormalization::RelativePath);
        let filtered = plain
            .clone()
            .with_filter(SnapshottingFilter::new(&["*.txt"], &[]).unwrap());

        let fp = filtered.fingerprint(&[tree("/p")]);
        assert_eq!(keys(&fp), vec!["a.txt"]);
        assert_ne!(plain.configuration_hash(), filtered.configuration_hash());
    }

    #[test]
    fn test_missing_root() {
        let missing = Arc::new(FileSystemLocationSnapshot::missing("/p/gone"));
        let relative = FingerprintingStrategy::new(PathNormalization::RelativePath);
        assert!(relative.fingerprint(&[Arc::clone(&missing)]).is_empty());

        let absolute = FingerprintingStrategy::new(PathNormalization::AbsolutePath);
        let fp = absolute.fingerprint(&[missing]);
        assert_eq!(fp.get("/p/gone").unwrap().file_type(), FileType::Missing);
        assert_eq!(fp.root_hashes().len(), 1);
    }

    #[test]
    fn test_hash_algorithm_is_part_of_configuration() {
        let sha = FingerprintingStrategy::new(PathNormalization::NameOnly);
        let xxh = sha.clone().with_hash_algorithm(HashAlgorithm::Xxh3);
        assert_ne!(sha.configuration_hash(), xxh.configuration_hash());
    }

    #[test]
    fn test_name_collisions_across_roots_ignore_root_order() {
        let x = Arc::new(FileSystemLocationSnapshot::directory(
            "/x",
            vec![file("/x/lib.a", "x")],
        ));
        let y = Arc::new(FileSystemLocationSnapshot::directory(
            "/y",
            vec![file("/y/lib.a", "y")],
        ));
        let strategy = FingerprintingStrategy::new(PathNormalization::NameOnly);
        let xy = strategy.fingerprint(&[Arc::clone(&x), Arc::clone(&y)]);
        let yx = strategy.fingerprint(&[y, x]);
        assert_eq!(xy.hash(), yx.hash());
        assert_eq!(xy.get("lib.a").unwrap().hash(), yx.get("lib.a").unwrap().hash());
    }

    #[test]
    fn test_default_excludes_are_part_of_configuration() {
        let standard = FingerprintingStrategy::new(PathNormalization::NameOnly);
        let none = standard
            .clone()
            .with_default_excludes(&DefaultExcludes::none());
        assert_ne!(standard.configuration_hash(), none.configuration_hash());

        let same = standard
            .clone()
            .with_default_excludes(&DefaultExcludes::default());
        assert_eq!(standard.configuration_hash(), same.configuration_hash());
    }
}
