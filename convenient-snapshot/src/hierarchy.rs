//! Persistent, path-indexed tree of file system knowledge.
//!
//! Every update returns a new [`SnapshotHierarchy`] sharing all untouched
//! nodes with the old one, so readers holding the old root keep a
//! consistent view. Only the nodes on the path to the update are copied.
//!
//! A node either holds a complete snapshot of its location (and then has no
//! child nodes) or only partial knowledge in the form of child nodes.

use crate::snapshot::FileSystemLocationSnapshot;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Node {
    snapshot: Option<Arc<FileSystemLocationSnapshot>>,
    children: BTreeMap<String, Arc<Node>>,
}

impl Node {
    fn leaf(snapshot: Arc<FileSystemLocationSnapshot>) -> Self {
        Self {
            snapshot: Some(snapshot),
            children: BTreeMap::new(),
        }
    }

    /// Replace a complete directory snapshot by one node per child, so a
    /// single child can be updated. Other snapshots are dropped: the caller
    /// is about to learn something below them, which contradicts them.
    fn split(&self) -> Node {
        match self.snapshot.as_deref() {
            Some(FileSystemLocationSnapshot::Directory(dir)) => Node {
                snapshot: None,
                children: dir
                    .children()
                    .iter()
                    .map(|child| {
                        (child.name().to_string(), Arc::new(Node::leaf(Arc::clone(child))))
                    })
                    .collect(),
            },
            Some(_) => Node::default(),
            None => self.clone(),
        }
    }

    fn collect_snapshots(&self, out: &mut Vec<Arc<FileSystemLocationSnapshot>>) {
        if let Some(snapshot) = &self.snapshot {
            out.push(Arc::clone(snapshot));
        }
        for child in self.children.values() {
            child.collect_snapshots(out);
        }
    }
}

/// In-memory tree of snapshots, indexed by absolute path.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHierarchy {
    root: Arc<Node>,
}

impl SnapshotHierarchy {
    /// An empty hierarchy
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if nothing is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.snapshot.is_none() && self.root.children.is_empty()
    }

    /// Find what is known about `path`.
    ///
    /// Locations below a stored directory are answered from its children;
    /// locations below a stored file or missing location are missing.
    #[must_use]
    pub fn find_snapshot(&self, path: &Path) -> Option<Arc<FileSystemLocationSnapshot>> {
        let segments = segments(path);
        let mut node = &self.root;

        for (index, segment) in segments.iter().enumerate() {
            if let Some(snapshot) = &node.snapshot {
                return Some(find_below(snapshot, &segments[index..], path));
            }
            node = node.children.get(segment)?;
        }

        node.snapshot.clone()
    }

    /// Return a hierarchy with `snapshot` stored at its absolute path,
    /// replacing whatever was known at or below that path.
    #[must_use]
    pub fn store(&self, snapshot: Arc<FileSystemLocationSnapshot>) -> Self {
        let segments = segments(snapshot.absolute_path());
        Self {
            root: Arc::new(store_at(&self.root, &segments, snapshot)),
        }
    }

    /// Return a hierarchy where nothing is known at or below `path`.
    ///
    /// Directory snapshots on the way to `path` can no longer be complete;
    /// they are split so their other children stay known. Every snapshot
    /// that is dropped or split is passed to `removed`.
    #[must_use]
    pub fn invalidate<F>(&self, path: &Path, removed: &mut F) -> Self
    where
        F: FnMut(&Arc<FileSystemLocationSnapshot>),
    {
        let segments = segments(path);
        Self {
            root: invalidate_at(&self.root, &segments, removed).unwrap_or_default(),
        }
    }

    /// All stored snapshots, outermost first along each branch.
    #[must_use]
    pub fn root_snapshots(&self) -> Vec<Arc<FileSystemLocationSnapshot>> {
        let mut out = Vec::new();
        self.root.collect_snapshots(&mut out);
        out
    }
}

fn find_below(
    snapshot: &Arc<FileSystemLocationSnapshot>,
    remaining: &[String],
    path: &Path,
) -> Arc<FileSystemLocationSnapshot> {
    let mut current = Arc::clone(snapshot);
    for segment in remaining {
        let next = match current.as_ref() {
            FileSystemLocationSnapshot::Directory(dir) => dir.child(segment).cloned(),
            _ => None,
        };
        match next {
            Some(child) => current = child,
            None => return Arc::new(FileSystemLocationSnapshot::missing(path)),
        }
    }
    current
}

fn store_at(node: &Node, segments: &[String], snapshot: Arc<FileSystemLocationSnapshot>) -> Node {
    match segments.split_first() {
        None => Node::leaf(snapshot),
        Some((head, rest)) => {
            let mut next = node.split();
            let child = next.children.get(head).cloned().unwrap_or_default();
            let _ = next
                .children
                .insert(head.clone(), Arc::new(store_at(&child, rest, snapshot)));
            next
        }
    }
}

/// Returns `None` if the node should be removed from its parent.
fn invalidate_at<F>(node: &Arc<Node>, segments: &[String], removed: &mut F) -> Option<Arc<Node>>
where
    F: FnMut(&Arc<FileSystemLocationSnapshot>),
{
    let Some((head, rest)) = segments.split_first() else {
        let mut dropped = Vec::new();
        node.collect_snapshots(&mut dropped);
        dropped.iter().for_each(|snapshot| removed(snapshot));
        return None;
    };

    match node.snapshot.as_ref() {
        Some(snapshot) => {
            removed(snapshot);
            if snapshot.children().is_empty() {
                // A file or missing location was assumed here; drop it entirely
                return None;
            }
        }
        None if !node.children.contains_key(head) => return Some(Arc::clone(node)),
        None => {}
    }

    let mut next = node.split();
    if let Some(child) = next.children.get(head).cloned() {
        match invalidate_at(&child, rest, removed) {
            Some(updated) => {
                let _ = next.children.insert(head.clone(), updated);
            }
            None => {
                let _ = next.children.remove(head);
            }
        }
    }

    if next.snapshot.is_none() && next.children.is_empty() {
        None
    } else {
        Some(Arc::new(next))
    }
}

/// Path segments converted the same lossy way as snapshot names, so a
/// non-UTF-8 path still finds its snapshot.
fn segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy().into_owned()),
            Component::RootDir | Component::CurDir | Component::ParentDir => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::snapshot::FileType;

    fn file(path: &str) -> Arc<FileSystemLocationSnapshot> {
        Arc::new(FileSystemLocationSnapshot::regular_file(
            path,
            ContentHash::from_bytes(path.as_bytes()),
        ))
    }

    fn project() -> Arc<FileSystemLocationSnapshot> {
        let src = Arc::new(FileSystemLocationSnapshot::directory(
            "/p/src",
            vec![file("/p/src/a.rs"), file("/p/src/b.rs")],
        ));
        Arc::new(FileSystemLocationSnapshot::directory(
            "/p",
            vec![src, file("/p/build.txt")],
        ))
    }

    #[test]
    fn test_find_inside_stored_directory() {
        let hierarchy = SnapshotHierarchy::empty().store(project());

        let found = hierarchy.find_snapshot(Path::new("/p/src/a.rs")).unwrap();
        assert_eq!(found.hash(), file("/p/src/a.rs").hash());

        let missing = hierarchy.find_snapshot(Path::new("/p/src/zzz.rs")).unwrap();
        assert_eq!(missing.file_type(), FileType::Missing);

        let below_file = hierarchy.find_snapshot(Path::new("/p/build.txt/x")).unwrap();
        assert_eq!(below_file.file_type(), FileType::Missing);

        assert!(hierarchy.find_snapshot(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn test_store_is_persistent() {
        let before = SnapshotHierarchy::empty().store(project());
        let after = before.store(file("/p/src/a.rs"));

        assert!(before.find_snapshot(Path::new("/p")).is_some());
        // The parent directory is no longer known as a whole
        assert!(after.find_snapshot(Path::new("/p")).is_none());
        assert!(after.find_snapshot(Path::new("/p/src/b.rs")).is_some());
    }

    #[test]
    fn test_invalidate_keeps_siblings_shared() {
        let hierarchy = SnapshotHierarchy::empty().store(project());
        let sibling_before = hierarchy.find_snapshot(Path::new("/p/build.txt")).unwrap();

        let mut removed = Vec::new();
        let invalidated = hierarchy.invalidate(Path::new("/p/src/a.rs"), &mut |s| {
            removed.push(s.absolute_path().to_path_buf());
        });

        assert!(invalidated.find_snapshot(Path::new("/p/src/a.rs")).is_none());
        assert!(invalidated.find_snapshot(Path::new("/p/src")).is_none());
        let sibling_after = invalidated.find_snapshot(Path::new("/p/build.txt")).unwrap();
        assert!(Arc::ptr_eq(&sibling_before, &sibling_after));
        assert!(invalidated.find_snapshot(Path::new("/p/src/b.rs")).is_some());
        assert_eq!(
            removed,
            vec![
                Path::new("/p").to_path_buf(),
                Path::new("/p/src").to_path_buf(),
                Path::new("/p/src/a.rs").to_path_buf(),
            ]
        );
    }

    #[test]
    fn test_invalidate_unknown_path_is_noop() {
        let hierarchy = SnapshotHierarchy::empty().store(file("/p/a.rs"));
        let invalidated = hierarchy.invalidate(Path::new("/q"), &mut |_| {});
        assert!(Arc::ptr_eq(&hierarchy.root, &invalidated.root));
    }

    #[test]
    fn test_invalidate_root_clears_everything() {
        let hierarchy = SnapshotHierarchy::empty().store(project());
        let invalidated = hierarchy.invalidate(Path::new("/"), &mut |_| {});
        assert!(invalidated.is_empty());
        assert_eq!(hierarchy.root_snapshots().len(), 1);
    }
}
