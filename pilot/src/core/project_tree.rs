//! In-memory project tree: ordering, ignore rules, and flattened rendering.
//!
//! Disk enumeration lives in [`crate::io::scan`]; everything here is pure.

use serde::Serialize;

/// Names hidden from the planner and from listings by default.
pub const DEFAULT_IGNORED: &[&str] = &[
    "node_modules",
    "dist",
    "target",
    ".git",
    ".pilot",
    "*.log",
    ".env",
    ".env.*",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    // Declaration order is sort order: directories first.
    Directory,
    File,
}

/// One file or directory in the project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    /// Path relative to the project root, `/`-separated. Empty for the root.
    pub path: String,
    pub kind: NodeKind,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: String::new(),
            kind: NodeKind::Directory,
            children: Vec::new(),
        }
    }

    /// Sort siblings directories-first, then by name, recursively.
    pub fn sort_children(&mut self) {
        self.children
            .sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        for child in &mut self.children {
            child.sort_children();
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// One line of the flattened tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatEntry {
    /// Indented display text.
    pub line: String,
    pub path: String,
    pub kind: NodeKind,
    pub name: String,
}

/// Pre-order traversal of `tree`, excluding the root itself.
///
/// Each level of depth indents by two spaces; directories get a trailing `/`.
pub fn flatten(tree: &TreeNode) -> Vec<FlatEntry> {
    let mut entries = Vec::new();
    for child in &tree.children {
        flatten_inner(child, 0, &mut entries);
    }
    entries
}

fn flatten_inner(node: &TreeNode, depth: usize, entries: &mut Vec<FlatEntry>) {
    let indent = "  ".repeat(depth);
    let suffix = if node.is_dir() { "/" } else { "" };
    entries.push(FlatEntry {
        line: format!("{indent}{}{suffix}", node.name),
        path: node.path.clone(),
        kind: node.kind,
        name: node.name.clone(),
    });
    for child in &node.children {
        flatten_inner(child, depth + 1, entries);
    }
}

/// Plain-text snapshot of the tree, as handed to the planner.
pub fn render_snapshot(tree: &TreeNode) -> String {
    let lines: Vec<String> = flatten(tree).into_iter().map(|e| e.line).collect();
    if lines.is_empty() {
        return "(empty project)".to_string();
    }
    lines.join("\n")
}

/// Name-based ignore rules.
///
/// A pattern is either an exact file/directory name, `*suffix` (matches names
/// ending with `suffix`), or `prefix*` (matches names starting with `prefix`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreSet {
    patterns: Vec<String>,
}

impl IgnoreSet {
    /// Default rules plus `extra`.
    pub fn with_defaults(extra: &[String]) -> Self {
        let mut patterns: Vec<String> = DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect();
        patterns.extend(extra.iter().cloned());
        Self { patterns }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| matches_pattern(p, name))
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::with_defaults(&[])
    }
}

fn matches_pattern(pattern: &str, name: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    pattern == name
}
