use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use parking_lot::RwLock;

/// One file or directory in a scanned tree.
///
/// Children are owned through `Arc`; the parent link is a `Weak` set once at
/// construction and only used to push size deltas upward and to rebuild the
/// full path. The root's `name` is the full path it was scanned from.
#[derive(Debug)]
pub struct FolderNode {
    name: String,
    is_file: bool,
    last_modified: Option<SystemTime>,
    size: AtomicU64,
    children: RwLock<Vec<Arc<FolderNode>>>,
    parent: Weak<FolderNode>,
    expanded: AtomicBool,
    owner: OnceLock<String>,
}

impl FolderNode {
    pub fn new_root(name: impl Into<String>, last_modified: Option<SystemTime>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), false, last_modified, 0, Weak::new()))
    }

    /// Creates a child of `parent` and appends it to the parent's children.
    ///
    /// `size` is stored on the child only; callers push it to the ancestors
    /// with [`FolderNode::add_size`] when it should count toward them.
    pub fn new_child(
        parent: &Arc<FolderNode>,
        name: impl Into<String>,
        is_file: bool,
        size: u64,
        last_modified: Option<SystemTime>,
    ) -> Arc<Self> {
        let child = Arc::new(Self::build(
            name.into(),
            is_file,
            last_modified,
            size,
            Arc::downgrade(parent),
        ));
        parent.children.write().push(Arc::clone(&child));
        child
    }

    fn build(
        name: String,
        is_file: bool,
        last_modified: Option<SystemTime>,
        size: u64,
        parent: Weak<FolderNode>,
    ) -> Self {
        Self {
            name,
            is_file,
            last_modified,
            size: AtomicU64::new(size),
            children: RwLock::new(Vec::new()),
            parent,
            expanded: AtomicBool::new(true),
            owner: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    pub fn add_size(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.size.fetch_add(bytes, Ordering::Relaxed);
        let mut current = self.parent.upgrade();
        while let Some(node) = current {
            node.size.fetch_add(bytes, Ordering::Relaxed);
            current = node.parent.upgrade();
        }
    }

    pub fn parent(&self) -> Option<Arc<FolderNode>> {
        self.parent.upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.parent.upgrade().is_none()
    }

    pub fn children(&self) -> Vec<Arc<FolderNode>> {
        self.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    pub fn with_children<R>(&self, f: impl FnOnce(&[Arc<FolderNode>]) -> R) -> R {
        f(&self.children.read())
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.load(Ordering::Relaxed)
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.expanded.store(expanded, Ordering::Relaxed);
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.get().map(String::as_str)
    }

    pub fn set_owner(&self, owner: String) -> &str {
        self.owner.get_or_init(|| owner)
    }

    pub fn display_type(&self) -> &str {
        if !self.is_file {
            return "";
        }
        match self.name.rfind('.') {
            Some(idx) if idx + 1 < self.name.len() => &self.name[idx..],
            _ => "",
        }
    }

    pub fn full_path(&self) -> PathBuf {
        let mut parts = vec![self.name.clone()];
        let mut current = self.parent.upgrade();
        while let Some(node) = current {
            parts.push(node.name.clone());
            current = node.parent.upgrade();
        }
        let mut path = PathBuf::new();
        for part in parts.into_iter().rev() {
            path.push(part);
        }
        path
    }

    pub fn count_folders(&self) -> u64 {
        if self.is_file {
            return 0;
        }
        1 + self
            .children()
            .iter()
            .map(|child| child.count_folders())
            .sum::<u64>()
    }

    pub fn count_files(&self) -> u64 {
        if self.is_file {
            return 1;
        }
        self.children()
            .iter()
            .map(|child| child.count_files())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn of(node: &Arc<FolderNode>) -> Self {
        NodeKey(Arc::as_ptr(node) as usize)
    }
}
