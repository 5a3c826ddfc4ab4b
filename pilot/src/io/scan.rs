//! Disk enumeration for the project tree snapshot.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::project_tree::{IgnoreSet, NodeKind, TreeNode, render_snapshot};

/// Recursively enumerate `root`, skipping ignored names (and everything below
/// an ignored directory).
///
/// Unreadable entries are logged and left out rather than failing the scan.
pub fn scan(root: &Path, ignore: &IgnoreSet) -> Result<TreeNode> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());

    // Pre-order walk; `stack[d]` is the open directory at depth `d`.
    let mut stack = vec![TreeNode::root(root_name)];
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !ignore.is_ignored(&entry.file_name().to_string_lossy()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(err = %err, "skipping unreadable entry");
                continue;
            }
        };
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("entry outside scan root {}", entry.path().display()))?;
        let path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let kind = if entry.file_type().is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };

        close_until(&mut stack, entry.depth());
        stack.push(TreeNode {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            kind,
            children: Vec::new(),
        });
    }
    close_until(&mut stack, 1);

    let mut tree = stack.pop().context("scan stack lost its root")?;
    tree.sort_children();
    debug!(root = %root.display(), entries = tree.children.len(), "scanned project tree");
    Ok(tree)
}

/// Pop finished nodes into their parents until `stack.len() == depth`.
fn close_until(stack: &mut Vec<TreeNode>, depth: usize) {
    while stack.len() > depth {
        let Some(done) = stack.pop() else {
            return;
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => {
                stack.push(done);
                return;
            }
        }
    }
}

/// Scan `root` and render the plain-text snapshot handed to the planner.
pub fn snapshot(root: &Path, ignore: &IgnoreSet) -> Result<String> {
    let tree = scan(root, ignore)?;
    Ok(render_snapshot(&tree))
}
