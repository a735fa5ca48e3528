//! File collection fingerprints.
//!
//! A fingerprint is the normalized, hashed view of a set of snapshot roots.
//! Fingerprints come in two lifecycle states: [`Current`] ones are computed
//! during this build, [`Previous`] ones were restored from history. The type
//! parameter keeps the two from being swapped when comparing.

use crate::normalization::PathNormalization;
use crate::strategy::FingerprintingStrategy;
use convenient_snapshot::{ContentHash, ContentHasher, FileType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One entry of a file collection fingerprint.
///
/// Equality and ordering only look at the normalized path, the file type
/// and the hash. The absolute path is carried for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSystemLocationFingerprint {
    normalized_path: String,
    file_type: FileType,
    hash: ContentHash,
    absolute_path: PathBuf,
}

impl FileSystemLocationFingerprint {
    /// Create an entry.
    #[must_use]
    pub fn new(
        normalized_path: impl Into<String>,
        file_type: FileType,
        hash: ContentHash,
        absolute_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            normalized_path: normalized_path.into(),
            file_type,
            hash,
            absolute_path: absolute_path.into(),
        }
    }

    /// Key of the entry inside its fingerprint
    #[must_use]
    pub fn normalized_path(&self) -> &str {
        &self.normalized_path
    }

    /// Type of the location
    #[must_use]
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Content hash, or the directory signature for directories
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Where the entry was found
    #[must_use]
    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Whether `other` describes different content for the same key.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.file_type != other.file_type || self.hash != other.hash
    }

    fn append_to_hasher(&self, hasher: &mut ContentHasher) {
        hasher.put_str(&self.normalized_path);
        hasher.put_tag(self.file_type.tag());
        hasher.put_hash(&self.hash);
    }

    fn key(&self) -> (&str, FileType, &ContentHash) {
        (&self.normalized_path, self.file_type, &self.hash)
    }
}

impl PartialEq for FileSystemLocationFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for FileSystemLocationFingerprint {}

impl PartialOrd for FileSystemLocationFingerprint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileSystemLocationFingerprint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// How entries are combined into the collection hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FingerprintHashingStrategy {
    /// Order does not matter; entries are hashed in natural order
    Sorted,
    /// Order matters; entries are hashed in declaration order
    Ordered,
}

/// Feed `fingerprints` into `hasher` according to `hashing`.
///
/// Under [`FingerprintHashingStrategy::Sorted`] the result is independent of
/// the order of `fingerprints`.
pub fn append_to_hasher(
    hashing: FingerprintHashingStrategy,
    hasher: &mut ContentHasher,
    fingerprints: &[FileSystemLocationFingerprint],
) {
    match hashing {
        FingerprintHashingStrategy::Sorted => {
            let mut sorted: Vec<_> = fingerprints.iter().collect();
            sorted.sort();
            sorted.into_iter().for_each(|fp| fp.append_to_hasher(hasher));
        }
        FingerprintHashingStrategy::Ordered => {
            fingerprints.iter().for_each(|fp| fp.append_to_hasher(hasher));
        }
    }
}

fn collection_hash(
    hashing: FingerprintHashingStrategy,
    fingerprints: &[FileSystemLocationFingerprint],
) -> ContentHash {
    let mut hasher = ContentHasher::new();
    append_to_hasher(hashing, &mut hasher, fingerprints);
    hasher.finish()
}

/// Snapshot hash of one root of a collection, keyed by its absolute path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootHash {
    /// Absolute path of the root
    pub path: String,
    /// Snapshot hash of the (filtered) root
    pub hash: ContentHash,
}

/// Marker for fingerprints computed in this build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Current;

/// Marker for fingerprints restored from execution history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Previous;

/// Fingerprint of a file collection in lifecycle state `L`
#[derive(Debug, Clone)]
pub struct FileCollectionFingerprint<L> {
    normalization: PathNormalization,
    hashing: FingerprintHashingStrategy,
    strategy_configuration_hash: ContentHash,
    entries: Vec<FileSystemLocationFingerprint>,
    index: HashMap<String, usize>,
    sorted: Vec<usize>,
    root_hashes: Vec<RootHash>,
    hash: ContentHash,
    lifecycle: PhantomData<L>,
}

/// Fingerprint computed in this build
pub type CurrentFileCollectionFingerprint = FileCollectionFingerprint<Current>;

/// Fingerprint restored from execution history
pub type PreviousFileCollectionFingerprint = FileCollectionFingerprint<Previous>;

impl<L> FileCollectionFingerprint<L> {
    /// Put a fingerprint together. The collection hash is computed unless
    /// `stored_hash` is given.
    pub(crate) fn assemble(
        normalization: PathNormalization,
        hashing: FingerprintHashingStrategy,
        strategy_configuration_hash: ContentHash,
        entries: Vec<FileSystemLocationFingerprint>,
        root_hashes: Vec<RootHash>,
        stored_hash: Option<ContentHash>,
    ) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, fp)| (fp.normalized_path.clone(), i))
            .collect();
        let mut sorted: Vec<usize> = (0..entries.len()).collect();
        sorted.sort_by(|&a, &b| entries[a].normalized_path.cmp(&entries[b].normalized_path));
        let hash = stored_hash.unwrap_or_else(|| collection_hash(hashing, &entries));

        Self {
            normalization,
            hashing,
            strategy_configuration_hash,
            entries,
            index,
            sorted,
            root_hashes,
            hash,
            lifecycle: PhantomData,
        }
    }

    /// Combined hash of all entries
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Normalization the entries were keyed with
    #[must_use]
    pub fn normalization(&self) -> PathNormalization {
        self.normalization
    }

    /// Identifier of the strategy that produced this fingerprint
    #[must_use]
    pub fn strategy_identifier(&self) -> &'static str {
        self.normalization.identifier()
    }

    /// How entries were combined
    #[must_use]
    pub fn hashing_strategy(&self) -> FingerprintHashingStrategy {
        self.hashing
    }

    /// Hash of the full strategy configuration, including filters
    #[must_use]
    pub fn strategy_configuration_hash(&self) -> &ContentHash {
        &self.strategy_configuration_hash
    }

    /// Entries in declaration order
    #[must_use]
    pub fn fingerprints(&self) -> &[FileSystemLocationFingerprint] {
        &self.entries
    }

    /// Entries in natural key order
    pub fn sorted_fingerprints(&self) -> impl Iterator<Item = &FileSystemLocationFingerprint> {
        self.sorted.iter().filter_map(|&i| self.entries.get(i))
    }

    pub(crate) fn sorted_at(&self, position: usize) -> Option<&FileSystemLocationFingerprint> {
        self.sorted.get(position).and_then(|&i| self.entries.get(i))
    }

    /// Entry with the given normalized path
    #[must_use]
    pub fn get(&self, normalized_path: &str) -> Option<&FileSystemLocationFingerprint> {
        self.index.get(normalized_path).and_then(|&i| self.entries.get(i))
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot hashes of the roots the fingerprint was built from
    #[must_use]
    pub fn root_hashes(&self) -> &[RootHash] {
        &self.root_hashes
    }

    /// Whether both fingerprints were built from identical roots.
    ///
    /// Sorted fingerprints compare the roots as a multiset, ordered ones as
    /// a sequence. Equal roots imply equal entries, so no entry needs to be
    /// looked at.
    #[must_use]
    pub fn has_same_root_hashes<M>(&self, other: &FileCollectionFingerprint<M>) -> bool {
        if self.hashing != other.hashing || self.root_hashes.len() != other.root_hashes.len() {
            return false;
        }
        match self.hashing {
            FingerprintHashingStrategy::Ordered => self.root_hashes == other.root_hashes,
            FingerprintHashingStrategy::Sorted => {
                let mut mine = self.root_hashes.clone();
                let mut theirs = other.root_hashes.clone();
                mine.sort();
                theirs.sort();
                mine == theirs
            }
        }
    }

    /// Whether the recorded hash matches the entries.
    ///
    /// A fingerprint read back from a damaged history record fails this
    /// check and must not be compared against.
    #[must_use]
    pub fn is_self_consistent(&self) -> bool {
        self.index.len() == self.entries.len()
            && collection_hash(self.hashing, &self.entries) == self.hash
    }

    fn relabel<M>(self) -> FileCollectionFingerprint<M> {
        FileCollectionFingerprint {
            normalization: self.normalization,
            hashing: self.hashing,
            strategy_configuration_hash: self.strategy_configuration_hash,
            entries: self.entries,
            index: self.index,
            sorted: self.sorted,
            root_hashes: self.root_hashes,
            hash: self.hash,
            lifecycle: PhantomData,
        }
    }
}

impl FileCollectionFingerprint<Current> {
    /// Build a fingerprint from already normalized entries.
    ///
    /// Entries are kept in the given order. Entries whose key was already
    /// seen are folded into the first one, as during fingerprinting.
    #[must_use]
    pub fn from_entries(
        strategy: &FingerprintingStrategy,
        entries: impl IntoIterator<Item = FileSystemLocationFingerprint>,
        root_hashes: Vec<RootHash>,
    ) -> Self {
        let mut builder = FingerprintBuilder::new(strategy);
        entries.into_iter().for_each(|fp| builder.push(fp));
        root_hashes
            .into_iter()
            .for_each(|root| builder.add_root(root.path, root.hash));
        builder.build()
    }

    /// Copy of this fingerprint as it will look when read back next build
    #[must_use]
    pub fn archive(&self) -> FileCollectionFingerprint<Previous> {
        self.clone().relabel()
    }

    /// Turn this fingerprint into a previous one without copying.
    #[must_use]
    pub fn into_previous(self) -> FileCollectionFingerprint<Previous> {
        self.relabel()
    }
}

impl FileCollectionFingerprint<Previous> {
    /// Whether `strategy` would produce fingerprints comparable to this one.
    #[must_use]
    pub fn was_created_with_strategy(&self, strategy: &FingerprintingStrategy) -> bool {
        self.strategy_identifier() == strategy.identifier()
            && self.strategy_configuration_hash == strategy.configuration_hash()
    }

    /// Whether `current` was produced by the same strategy configuration.
    #[must_use]
    pub fn is_compatible_with(&self, current: &FileCollectionFingerprint<Current>) -> bool {
        self.normalization == current.normalization
            && self.hashing == current.hashing
            && self.strategy_configuration_hash == current.strategy_configuration_hash
    }
}

/// Collects entries for one fingerprint, resolving key collisions.
pub(crate) struct FingerprintBuilder {
    normalization: PathNormalization,
    hashing: FingerprintHashingStrategy,
    configuration_hash: ContentHash,
    entries: Vec<FileSystemLocationFingerprint>,
    index: HashMap<String, usize>,
    root_hashes: Vec<RootHash>,
    /// Later entries sharing the key of `entries[i]`, in walk order
    collided: HashMap<usize, Vec<FileSystemLocationFingerprint>>,
}

impl FingerprintBuilder {
    pub(crate) fn new(strategy: &FingerprintingStrategy) -> Self {
        Self {
            normalization: strategy.normalization(),
            hashing: strategy.hashing(),
            configuration_hash: strategy.configuration_hash(),
            entries: Vec::new(),
            index: HashMap::new(),
            root_hashes: Vec::new(),
            collided: HashMap::new(),
        }
    }

    pub(crate) fn add_root(&mut self, path: String, hash: ContentHash) {
        self.root_hashes.push(RootHash { path, hash });
    }

    /// The first entry for a key keeps its place; later entries with the
    /// same key are folded into it when the fingerprint is built.
    pub(crate) fn push(&mut self, fingerprint: FileSystemLocationFingerprint) {
        if let Some(&i) = self.index.get(&fingerprint.normalized_path) {
            self.collided.entry(i).or_default().push(fingerprint);
            return;
        }
        let _ = self
            .index
            .insert(fingerprint.normalized_path.clone(), self.entries.len());
        self.entries.push(fingerprint);
    }

    /// Combine the entries sharing one key. Sorted fingerprints fold the
    /// hashes in hash order and report the smallest absolute path, so the
    /// order of the roots does not matter. Ordered fingerprints fold in walk
    /// order.
    fn fold(
        hashing: FingerprintHashingStrategy,
        mut group: Vec<FileSystemLocationFingerprint>,
    ) -> Option<FileSystemLocationFingerprint> {
        if hashing == FingerprintHashingStrategy::Sorted {
            group.sort_by(|a, b| {
                (&a.hash, a.file_type, &a.absolute_path)
                    .cmp(&(&b.hash, b.file_type, &b.absolute_path))
            });
        }
        let mut hasher = ContentHasher::new();
        group.iter().for_each(|entry| hasher.put_hash(&entry.hash));
        let hash = hasher.finish();

        let representative = match hashing {
            FingerprintHashingStrategy::Sorted => group
                .into_iter()
                .min_by(|a, b| a.absolute_path.cmp(&b.absolute_path)),
            FingerprintHashingStrategy::Ordered => group.into_iter().next(),
        };
        representative.map(|entry| FileSystemLocationFingerprint { hash, ..entry })
    }

    pub(crate) fn build(mut self) -> FileCollectionFingerprint<Current> {
        let collisions: usize = self.collided.values().map(Vec::len).sum();
        if collisions > 0 {
            warn!(
                "{} entries share a normalized path under {}; their hashes were combined",
                collisions,
                self.normalization.identifier()
            );
        }
        for (i, others) in std::mem::take(&mut self.collided) {
            let Some(slot) = self.entries.get_mut(i) else {
                continue;
            };
            let group = std::iter::once(slot.clone()).chain(others).collect();
            if let Some(folded) = Self::fold(self.hashing, group) {
                *slot = folded;
            }
        }
        FileCollectionFingerprint::assemble(
            self.normalization,
            self.hashing,
            self.configuration_hash,
            self.entries,
            self.root_hashes,
            None,
        )
    }
}
