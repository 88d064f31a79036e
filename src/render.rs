use std::sync::Arc;
use std::time::SystemTime;

use crate::cancel::CancelToken;
use crate::error::Cancelled;
use crate::format::{SizeUnit, format_size};
use crate::measure::display_width;
use crate::node::FolderNode;
use crate::view_cache::ViewFilterCache;

pub const BRANCH: &str = "┣";
pub const LAST_BRANCH: &str = "┗";
pub const VERTICAL: &str = "┃";
pub const BLANK: &str = " ";

pub const COLUMN_GAP: usize = 4;

pub const DEFAULT_NOT_FOUND_LABEL: &str = "Not found";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub use_spaces: bool,
    pub tab_width: usize,
    pub unit: SizeUnit,
    pub not_found_label: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            use_spaces: true,
            tab_width: crate::config::DEFAULT_TAB_WIDTH,
            unit: SizeUnit::GB,
            not_found_label: DEFAULT_NOT_FOUND_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeRow {
    pub node: Arc<FolderNode>,
    pub depth: usize,
    pub display_text: String,
    pub size_text: String,
    pub indented_name: String,
    pub display_type: String,
    pub last_modified: Option<SystemTime>,
    pub owner: Option<String>,
    pub not_found: bool,
}

pub fn measure_max_label_width(root: &Arc<FolderNode>, cache: &ViewFilterCache) -> usize {
    measure_node(root, cache, 0, true, true)
}

fn measure_node(
    node: &Arc<FolderNode>,
    cache: &ViewFilterCache,
    indent_width: usize,
    is_last: bool,
    is_root: bool,
) -> usize {
    let prefix = if is_root { 0 } else { display_width(branch(is_last)) };
    let mut max = indent_width + prefix + display_width(node.name());

    if descends(node) {
        let child_indent = indent_width
            + if is_root {
                0
            } else {
                display_width(&child_indent_segment(is_last))
            };
        let children = cache.visible_children(node);
        let last = children.len().saturating_sub(1);
        for (idx, child) in children.iter().enumerate() {
            max = max.max(measure_node(child, cache, child_indent, idx == last, false));
        }
    }
    max
}

pub fn padding(column: usize, target: usize, use_spaces: bool, tab_width: usize) -> String {
    let tab_width = tab_width.max(1);
    let mut out = String::new();
    let mut column = column;
    while column < target {
        if use_spaces {
            out.push(' ');
            column += 1;
        } else {
            out.push('\t');
            column += tab_width - column % tab_width;
        }
    }
    out
}

fn branch(is_last: bool) -> &'static str {
    if is_last { LAST_BRANCH } else { BRANCH }
}

fn child_indent_segment(is_last: bool) -> String {
    if is_last {
        BLANK.repeat(3)
    } else {
        format!("{VERTICAL}{BLANK}")
    }
}

fn child_indent(indent: &str, is_last: bool, is_root: bool) -> String {
    if is_root {
        indent.to_string()
    } else {
        format!("{indent}{}", child_indent_segment(is_last))
    }
}

fn descends(node: &FolderNode) -> bool {
    node.is_file() || node.is_expanded()
}

struct Line {
    indented_name: String,
    display_text: String,
    size_text: String,
}

/// Text-tree and row renderer over a built [`ViewFilterCache`].
///
/// Both outputs share one target column and one padding routine, so a
/// row's `display_text` is exactly the corresponding line of the text tree.
pub struct TreeRenderer<'a> {
    cache: &'a ViewFilterCache,
    options: RenderOptions,
    target_column: usize,
}

impl<'a> TreeRenderer<'a> {
    pub fn new(cache: &'a ViewFilterCache, options: RenderOptions) -> Self {
        let target_column = measure_max_label_width(cache.root(), cache) + COLUMN_GAP;
        Self::with_target_column(cache, options, target_column)
    }

    pub fn with_target_column(
        cache: &'a ViewFilterCache,
        options: RenderOptions,
        target_column: usize,
    ) -> Self {
        Self {
            cache,
            options,
            target_column,
        }
    }

    pub fn target_column(&self) -> usize {
        self.target_column
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    fn root_missing(&self) -> bool {
        self.cache.root().size() < self.cache.params().threshold_bytes
    }

    fn not_found_text(&self) -> String {
        format!("{LAST_BRANCH}{}", self.options.not_found_label)
    }

    fn line(&self, node: &FolderNode, indent: &str, is_last: bool, is_root: bool) -> Line {
        let indented_name = if is_root {
            node.name().to_string()
        } else {
            format!("{indent}{}{}", branch(is_last), node.name())
        };
        let size_text = format_size(node.size(), self.options.unit);
        let pad = padding(
            display_width(&indented_name),
            self.target_column,
            self.options.use_spaces,
            self.options.tab_width,
        );
        let display_text = format!("{indented_name}{pad}{size_text}");
        Line {
            indented_name,
            display_text,
            size_text,
        }
    }

    pub fn render_text(&self, cancel: &CancelToken) -> Result<String, Cancelled> {
        cancel.check()?;
        let mut out = String::new();
        if self.root_missing() {
            out.push_str(&self.not_found_text());
            out.push('\n');
            return Ok(out);
        }
        self.write_node(&mut out, self.cache.root(), "", true, true, cancel)?;
        Ok(out)
    }

    fn write_node(
        &self,
        out: &mut String,
        node: &Arc<FolderNode>,
        indent: &str,
        is_last: bool,
        is_root: bool,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled> {
        cancel.check()?;
        let line = self.line(node, indent, is_last, is_root);
        out.push_str(&line.display_text);
        out.push('\n');

        if !descends(node) {
            return Ok(());
        }
        let children = self.cache.visible_children(node);
        let child_indent = child_indent(indent, is_last, is_root);
        let last = children.len().saturating_sub(1);
        for (idx, child) in children.iter().enumerate() {
            self.write_node(out, child, &child_indent, idx == last, false, cancel)?;
        }
        Ok(())
    }

    pub fn rows(&self, cancel: &CancelToken) -> Rows<'_> {
        let mut rows = Rows {
            renderer: self,
            stack: Vec::new(),
            pending: None,
            cancel: cancel.clone(),
        };
        if self.root_missing() {
            let text = self.not_found_text();
            rows.pending = Some(TreeRow {
                node: Arc::clone(self.cache.root()),
                depth: 0,
                display_text: text.clone(),
                size_text: String::new(),
                indented_name: text,
                display_type: String::new(),
                last_modified: None,
                owner: None,
                not_found: true,
            });
        } else {
            rows.stack.push(Frame {
                node: Arc::clone(self.cache.root()),
                indent: String::new(),
                is_last: true,
                is_root: true,
                depth: 0,
            });
        }
        rows
    }
}

struct Frame {
    node: Arc<FolderNode>,
    indent: String,
    is_last: bool,
    is_root: bool,
    depth: usize,
}

pub struct Rows<'a> {
    renderer: &'a TreeRenderer<'a>,
    stack: Vec<Frame>,
    pending: Option<TreeRow>,
    cancel: CancelToken,
}

impl Iterator for Rows<'_> {
    type Item = TreeRow;

    fn next(&mut self) -> Option<TreeRow> {
        if self.cancel.is_cancelled() {
            self.stack.clear();
            self.pending = None;
            return None;
        }
        if let Some(row) = self.pending.take() {
            return Some(row);
        }

        let frame = self.stack.pop()?;
        let line = self
            .renderer
            .line(&frame.node, &frame.indent, frame.is_last, frame.is_root);

        if descends(&frame.node) {
            let children = self.renderer.cache.visible_children(&frame.node);
            let child_indent = child_indent(&frame.indent, frame.is_last, frame.is_root);
            let last = children.len().saturating_sub(1);
            for (idx, child) in children.iter().enumerate().rev() {
                self.stack.push(Frame {
                    node: Arc::clone(child),
                    indent: child_indent.clone(),
                    is_last: idx == last,
                    is_root: false,
                    depth: frame.depth + 1,
                });
            }
        }

        let node = frame.node;
        Some(TreeRow {
            depth: frame.depth,
            display_text: line.display_text,
            size_text: line.size_text,
            indented_name: line.indented_name,
            display_type: node.display_type().to_string(),
            last_modified: node.last_modified(),
            owner: node.owner().map(str::to_string),
            not_found: false,
            node,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_cache::ViewParams;

    fn file(parent: &Arc<FolderNode>, name: &str, size: u64) -> Arc<FolderNode> {
        let node = FolderNode::new_child(parent, name, true, size, None);
        parent.add_size(size);
        node
    }

    fn sample() -> (Arc<FolderNode>, Arc<FolderNode>) {
        let root = FolderNode::new_root("/r", None);
        file(&root, "big.bin", 2000);
        file(&root, "small.bin", 10);
        let sub = FolderNode::new_child(&root, "sub", false, 0, None);
        file(&sub, "big2.bin", 3000);
        (root, sub)
    }

    fn bytes_options() -> RenderOptions {
        RenderOptions {
            unit: SizeUnit::B,
            ..RenderOptions::default()
        }
    }

    fn cache_for(root: &Arc<FolderNode>, threshold_bytes: u64) -> ViewFilterCache {
        let params = ViewParams {
            threshold_bytes,
            ..ViewParams::default()
        };
        ViewFilterCache::build(root, params, &CancelToken::new()).expect("cache")
    }

    #[test]
    fn wide_names_widen_the_label_column() {
        let root = FolderNode::new_root("r", None);
        file(&root, "a", 2);
        file(&root, "日", 1);
        let cache = cache_for(&root, 0);
        // glyph (2) + "日" (2)
        assert_eq!(measure_max_label_width(&root, &cache), 4);
    }

    #[test]
    fn renders_aligned_tree() {
        let (root, _) = sample();
        let cache = cache_for(&root, 1000);
        let renderer = TreeRenderer::new(&cache, bytes_options());
        // widest label is "┃ ┗big2.bin": 3 + 2 + 8
        assert_eq!(renderer.target_column(), 13 + COLUMN_GAP);

        let text = renderer.render_text(&CancelToken::new()).expect("render");
        let expected = [
            format!("/r{}  5,010 B", " ".repeat(15)),
            format!("┣sub{}  3,000 B", " ".repeat(12)),
            format!("┃ ┗big2.bin{}  3,000 B", " ".repeat(4)),
            format!("┗big.bin{}  2,000 B", " ".repeat(8)),
        ];
        assert_eq!(text, expected.join("\n") + "\n");
    }

    #[test]
    fn tab_padding_advances_to_tab_stops() {
        assert_eq!(padding(2, 17, false, 8), "\t\t\t");
        assert_eq!(padding(16, 17, false, 8), "\t");
        assert_eq!(padding(17, 17, false, 8), "");
        assert_eq!(padding(5, 9, true, 8), "    ");
        assert_eq!(padding(3, 5, false, 0), "\t\t");
    }

    #[test]
    fn collapsed_folder_hides_children_but_keeps_size() {
        let (root, sub) = sample();
        sub.set_expanded(false);
        let cache = cache_for(&root, 1000);
        let renderer = TreeRenderer::new(&cache, bytes_options());
        let text = renderer.render_text(&CancelToken::new()).expect("render");
        assert!(!text.contains("big2.bin"));
        assert!(text.lines().any(|line| line.starts_with("┣sub") && line.ends_with("3,000 B")));
    }

    #[test]
    fn root_below_threshold_is_not_found() {
        let (root, _) = sample();
        let cache = cache_for(&root, 1_000_000);
        let renderer = TreeRenderer::new(&cache, bytes_options());
        assert_eq!(
            renderer.render_text(&CancelToken::new()).expect("render"),
            "┗Not found\n"
        );
        let rows: Vec<TreeRow> = renderer.rows(&CancelToken::new()).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].not_found);
        assert_eq!(rows[0].display_text, "┗Not found");
        assert!(rows[0].size_text.is_empty());
    }

    #[test]
    fn rows_carry_node_details() {
        let (root, _) = sample();
        let cache = cache_for(&root, 1000);
        let renderer = TreeRenderer::new(&cache, bytes_options());
        let rows: Vec<TreeRow> = renderer.rows(&CancelToken::new()).collect();
        let names: Vec<&str> = rows.iter().map(|row| row.node.name()).collect();
        assert_eq!(names, ["/r", "sub", "big2.bin", "big.bin"]);
        assert_eq!(rows[2].depth, 2);
        assert_eq!(rows[2].indented_name, "┃ ┗big2.bin");
        assert_eq!(rows[2].display_type, ".bin");
        assert_eq!(rows[2].size_text.trim(), "3,000 B");
        assert_eq!(rows[1].display_type, "");
    }

    #[test]
    fn cancelled_render_stops() {
        let (root, _) = sample();
        let cache = cache_for(&root, 0);
        let renderer = TreeRenderer::new(&cache, bytes_options());
        let cancel = CancelToken::new();
        let mut rows = renderer.rows(&cancel);
        assert!(rows.next().is_some());
        cancel.cancel();
        assert!(rows.next().is_none());
        assert_eq!(renderer.render_text(&cancel), Err(Cancelled));
    }
}
