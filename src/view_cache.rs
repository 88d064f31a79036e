use std::borrow::Cow;
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Cancelled;
use crate::filter::TreeFilter;
use crate::node::{FolderNode, NodeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    Size,
    Name,
    Date,
    Type,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "size" => Ok(SortKey::Size),
            "name" => Ok(SortKey::Name),
            "date" | "modified" => Ok(SortKey::Date),
            "type" | "ext" | "extension" => Ok(SortKey::Type),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SortKey::Size => "size",
            SortKey::Name => "name",
            SortKey::Date => "date",
            SortKey::Type => "type",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewParams {
    pub threshold_bytes: u64,
    pub include_files: bool,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
    pub filter: TreeFilter,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            threshold_bytes: 0,
            include_files: true,
            sort_key: SortKey::Size,
            sort_direction: SortDirection::Descending,
            filter: TreeFilter::everything(),
        }
    }
}

impl ViewParams {
    pub fn is_eligible(&self, node: &FolderNode) -> bool {
        node.size() >= self.threshold_bytes && (self.include_files || !node.is_file())
    }
}

pub struct ViewFilterCache {
    root: Arc<FolderNode>,
    params: ViewParams,
    entries: HashMap<NodeKey, Vec<Arc<FolderNode>>>,
    root_kept: bool,
}

impl ViewFilterCache {
    /// Computes the visible children of every node under `root`.
    ///
    /// With a non-empty filter a child is kept when its own name matches or
    /// any eligible descendant matches, so folders stay visible as the path
    /// to a match. Sibling subtrees are evaluated in parallel.
    pub fn build(
        root: &Arc<FolderNode>,
        params: ViewParams,
        cancel: &CancelToken,
    ) -> Result<Self, Cancelled> {
        let entries = DashMap::new();
        let root_kept = build_node(root, &params, &entries, cancel)?;
        Ok(Self {
            root: Arc::clone(root),
            params,
            entries: entries.into_iter().collect(),
            root_kept,
        })
    }

    pub fn root(&self) -> &Arc<FolderNode> {
        &self.root
    }

    pub fn params(&self) -> &ViewParams {
        &self.params
    }

    pub fn root_kept(&self) -> bool {
        self.root_kept
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, node: &Arc<FolderNode>) -> Option<&[Arc<FolderNode>]> {
        self.entries.get(&NodeKey::of(node)).map(Vec::as_slice)
    }

    pub fn visible_children(&self, node: &Arc<FolderNode>) -> Cow<'_, [Arc<FolderNode>]> {
        match self.get(node) {
            Some(children) => Cow::Borrowed(children),
            None => Cow::Owned(node.with_children(|children| {
                children
                    .iter()
                    .filter(|child| self.params.is_eligible(child))
                    .cloned()
                    .collect()
            })),
        }
    }
}

fn build_node(
    node: &Arc<FolderNode>,
    params: &ViewParams,
    entries: &DashMap<NodeKey, Vec<Arc<FolderNode>>>,
    cancel: &CancelToken,
) -> Result<bool, Cancelled> {
    cancel.check()?;

    let filtering = !params.filter.is_empty();
    let self_match = !filtering || params.filter.is_match(node.name());

    let mut candidates: Vec<Arc<FolderNode>> = node.with_children(|children| {
        children
            .iter()
            .filter(|child| params.is_eligible(child))
            .cloned()
            .collect()
    });
    sort_children(&mut candidates, params.sort_key, params.sort_direction);

    let kept: Vec<bool> = candidates
        .par_iter()
        .map(|child| build_node(child, params, entries, cancel))
        .collect::<Result<_, _>>()?;

    let visible: Vec<Arc<FolderNode>> = candidates
        .into_iter()
        .zip(kept)
        .filter_map(|(child, keep)| keep.then_some(child))
        .collect();
    let has_kept_descendant = !visible.is_empty();
    entries.insert(NodeKey::of(node), visible);

    Ok(!filtering || self_match || has_kept_descendant)
}

pub fn sort_children(children: &mut [Arc<FolderNode>], key: SortKey, direction: SortDirection) {
    match key {
        // sizes may still be growing under a live scan, so each is read once
        SortKey::Size => match direction {
            SortDirection::Ascending => children.sort_by_cached_key(|child| child.size()),
            SortDirection::Descending => children.sort_by_cached_key(|child| Reverse(child.size())),
        },
        SortKey::Name => sort_with(children, direction, |a, b| compare_names(a.name(), b.name())),
        SortKey::Date => sort_with(children, direction, |a, b| a.last_modified().cmp(&b.last_modified())),
        SortKey::Type => sort_with(children, direction, |a, b| {
            compare_names(a.display_type(), b.display_type())
        }),
    }
}

fn sort_with(
    children: &mut [Arc<FolderNode>],
    direction: SortDirection,
    compare: impl Fn(&Arc<FolderNode>, &Arc<FolderNode>) -> Ordering,
) {
    match direction {
        SortDirection::Ascending => children.sort_by(compare),
        SortDirection::Descending => children.sort_by(|a, b| compare(b, a)),
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(parent: &Arc<FolderNode>, name: &str, size: u64) -> Arc<FolderNode> {
        let node = FolderNode::new_child(parent, name, true, size, None);
        parent.add_size(size);
        node
    }

    fn dir(parent: &Arc<FolderNode>, name: &str) -> Arc<FolderNode> {
        FolderNode::new_child(parent, name, false, 0, None)
    }

    fn names(children: &[Arc<FolderNode>]) -> Vec<&str> {
        children.iter().map(|child| child.name()).collect()
    }

    #[test]
    fn pass_through_without_filtering() {
        let root = FolderNode::new_root("/r", None);
        file(&root, "b.bin", 10);
        file(&root, "a.bin", 30);
        let sub = dir(&root, "sub");
        file(&sub, "c.bin", 20);

        let cache = ViewFilterCache::build(&root, ViewParams::default(), &CancelToken::new())
            .expect("build");
        assert!(cache.root_kept());
        assert_eq!(names(cache.get(&root).expect("root")), ["a.bin", "sub", "b.bin"]);
        assert_eq!(names(cache.get(&sub).expect("sub")), ["c.bin"]);
    }

    #[test]
    fn threshold_and_include_files() {
        let root = FolderNode::new_root("/r", None);
        file(&root, "big.bin", 2000);
        file(&root, "small.bin", 10);
        let sub = dir(&root, "sub");
        file(&sub, "big2.bin", 3000);

        let params = ViewParams {
            threshold_bytes: 1000,
            ..ViewParams::default()
        };
        let cache = ViewFilterCache::build(&root, params.clone(), &CancelToken::new())
            .expect("build");
        assert_eq!(names(cache.get(&root).expect("root")), ["sub", "big.bin"]);

        let folders_only = ViewParams {
            include_files: false,
            ..params
        };
        let cache = ViewFilterCache::build(&root, folders_only, &CancelToken::new())
            .expect("build");
        assert_eq!(names(cache.get(&root).expect("root")), ["sub"]);
        assert!(cache.get(&sub).expect("sub").is_empty());
    }

    #[test]
    fn filter_keeps_path_to_matching_grandchild() {
        let root = FolderNode::new_root("/r", None);
        let projects = dir(&root, "projects");
        let build = dir(&projects, "build");
        file(&build, "output.log", 5);
        file(&build, "output.bin", 5);
        let other = dir(&root, "other");
        file(&other, "notes.txt", 5);

        let params = ViewParams {
            filter: TreeFilter::compile("*.log", false),
            ..ViewParams::default()
        };
        let cache = ViewFilterCache::build(&root, params, &CancelToken::new()).expect("build");
        assert!(cache.root_kept());
        assert_eq!(names(cache.get(&root).expect("root")), ["projects"]);
        assert_eq!(names(cache.get(&projects).expect("projects")), ["build"]);
        assert_eq!(names(cache.get(&build).expect("build")), ["output.log"]);
        assert!(cache.get(&other).expect("other").is_empty());
    }

    #[test]
    fn filter_does_not_reach_through_ineligible_nodes() {
        let root = FolderNode::new_root("/r", None);
        let sub = dir(&root, "sub");
        file(&sub, "tiny.log", 1);
        file(&root, "huge.bin", 5000);

        let params = ViewParams {
            threshold_bytes: 100,
            filter: TreeFilter::compile("*.log", false),
            ..ViewParams::default()
        };
        let cache = ViewFilterCache::build(&root, params, &CancelToken::new()).expect("build");
        assert!(!cache.root_kept());
        assert!(cache.get(&root).expect("root").is_empty());
    }

    #[test]
    fn invalid_filter_hides_everything() {
        let root = FolderNode::new_root("/r", None);
        file(&root, "a", 1);
        let params = ViewParams {
            filter: TreeFilter::compile("[", true),
            ..ViewParams::default()
        };
        let cache = ViewFilterCache::build(&root, params, &CancelToken::new()).expect("build");
        assert!(cache.get(&root).expect("root").is_empty());
    }

    #[test]
    fn sorts_are_stable() {
        let root = FolderNode::new_root("/r", None);
        file(&root, "first", 5);
        file(&root, "second", 5);
        file(&root, "Alpha", 1);
        let mut children = root.children();

        sort_children(&mut children, SortKey::Size, SortDirection::Descending);
        assert_eq!(names(&children), ["first", "second", "Alpha"]);
        sort_children(&mut children, SortKey::Size, SortDirection::Ascending);
        assert_eq!(names(&children), ["Alpha", "first", "second"]);
        sort_children(&mut children, SortKey::Name, SortDirection::Ascending);
        assert_eq!(names(&children), ["Alpha", "first", "second"]);
        sort_children(&mut children, SortKey::Name, SortDirection::Descending);
        assert_eq!(names(&children), ["second", "first", "Alpha"]);
    }

    #[test]
    fn type_sort_groups_by_extension() {
        let root = FolderNode::new_root("/r", None);
        file(&root, "b.txt", 1);
        dir(&root, "folder");
        file(&root, "a.bin", 1);
        let mut children = root.children();
        sort_children(&mut children, SortKey::Type, SortDirection::Ascending);
        assert_eq!(names(&children), ["folder", "a.bin", "b.txt"]);
    }

    #[test]
    fn falls_back_for_nodes_added_after_build() {
        let root = FolderNode::new_root("/r", None);
        let cache = ViewFilterCache::build(&root, ViewParams::default(), &CancelToken::new())
            .expect("build");
        let late = dir(&root, "late");
        file(&late, "x", 3);
        assert!(cache.get(&late).is_none());
        assert_eq!(names(&cache.visible_children(&late)), ["x"]);
    }

    #[test]
    fn cancelled_build_returns_cancelled() {
        let root = FolderNode::new_root("/r", None);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(ViewFilterCache::build(&root, ViewParams::default(), &cancel).is_err());
    }

    #[test]
    fn size_sort_tolerates_concurrent_growth() {
        let root = FolderNode::new_root("/r", None);
        for idx in 0..2000u64 {
            file(&root, &format!("f{idx}"), idx % 97);
        }
        let children = root.children();
        let done = std::sync::atomic::AtomicBool::new(false);
        std::thread::scope(|scope| {
            for worker in 0..4usize {
                let children = &children;
                let done = &done;
                scope.spawn(move || {
                    let mut idx = worker * 7919;
                    while !done.load(std::sync::atomic::Ordering::Relaxed) {
                        idx = (idx * 31 + 17) % children.len();
                        children[idx].add_size(1 + idx as u64 % 13);
                    }
                });
            }
            for _ in 0..300 {
                let mut snapshot = children.clone();
                sort_children(&mut snapshot, SortKey::Size, SortDirection::Descending);
                assert_eq!(snapshot.len(), children.len());
                sort_children(&mut snapshot, SortKey::Size, SortDirection::Ascending);
                assert_eq!(snapshot.len(), children.len());
            }
            done.store(true, std::sync::atomic::Ordering::Relaxed);
        });
    }

    #[test]
    fn size_sort_keeps_ties_in_scan_order() {
        let root = FolderNode::new_root("/r", None);
        file(&root, "a", 5);
        file(&root, "b", 9);
        file(&root, "c", 5);
        let mut children = root.children();
        sort_children(&mut children, SortKey::Size, SortDirection::Descending);
        assert_eq!(names(&children), ["b", "a", "c"]);
        sort_children(&mut children, SortKey::Size, SortDirection::Ascending);
        assert_eq!(names(&children), ["a", "c", "b"]);
    }
}
