use std::collections::HashMap;

use crate::types::{BeadSummary, BeadType};

/// Unicode box-drawing fragments for tree prefixes.
const TREE_BRANCH: &str = "├── ";
const TREE_LAST: &str = "└── ";
const TREE_PIPE: &str = "│   ";
const TREE_SPACE: &str = "    ";

/// Row label shown beneath an expanded node with nothing under it.
pub const EMPTY_CHILDREN_LABEL: &str = "(no open tasks)";

// --- Tree nodes ---

/// One node in the bead forest. Nodes live only for the duration of a single
/// browse refresh; expansion decisions are persisted separately by id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub bead: BeadSummary,
    pub children: Vec<TreeNode>,
    pub is_last: bool,
    pub expanded: bool,
}

impl TreeNode {
    fn new(bead: BeadSummary) -> Self {
        Self {
            bead,
            children: Vec::new(),
            is_last: false,
            expanded: false,
        }
    }
}

/// Descendant counts for a node (the node itself is excluded).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Progress {
    pub total: usize,
    pub closed: usize,
}

// --- Flattened rows ---

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlatKind {
    Bead(BeadSummary),
    /// Pseudo-row under an expanded node with no children.
    Placeholder,
}

/// A pre-composed rendering record. Walking a flattened forest top to bottom
/// yields exactly the rows visible under the current expansion state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatNode {
    pub kind: FlatKind,
    pub prefix: String,
    pub depth: usize,
    pub expanded: bool,
    pub child_count: usize,
    pub open_child_count: usize,
    pub progress: Progress,
}

impl FlatNode {
    pub fn bead(&self) -> Option<&BeadSummary> {
        match &self.kind {
            FlatKind::Bead(bead) => Some(bead),
            FlatKind::Placeholder => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, FlatKind::Placeholder)
    }

    pub fn has_children(&self) -> bool {
        self.child_count > 0
    }
}

// --- Id helpers ---

/// The dotted-prefix parent of an id; empty when the id has no dot.
pub fn find_dot_parent_id(id: &str) -> &str {
    match id.rfind('.') {
        Some(idx) => &id[..idx],
        None => "",
    }
}

/// True iff `child_id` sits strictly below `parent_id` in the dotted
/// hierarchy. `demo-10` is unrelated to `demo-1`: the separator must be a dot.
pub fn is_child_of(child_id: &str, parent_id: &str) -> bool {
    child_id.len() > parent_id.len() + 1
        && child_id.starts_with(parent_id)
        && child_id.as_bytes()[parent_id.len()] == b'.'
}

// --- List merging ---

/// Merge the ready and closed lists into one input sequence. Ready beads win
/// id collisions.
pub fn merge_bead_lists(ready: Vec<BeadSummary>, closed: Vec<BeadSummary>) -> Vec<BeadSummary> {
    let mut merged = ready;
    for bead in closed {
        if !merged.iter().any(|b| b.id == bead.id) {
            merged.push(bead);
        }
    }
    merged
}

// --- Building ---

/// Build the forest from a flat bead list.
///
/// Ids are sorted lexicographically, and each bead attaches beneath the
/// already-inserted node whose id is the longest present dotted prefix of its
/// own. Beads whose literal parent is absent attach to the nearest present
/// ancestor, or become roots.
///
/// Expansion: an id present in `expanded_map` uses the recorded value;
/// otherwise epics default to expanded and every other bead to collapsed.
pub fn build(beads: &[BeadSummary], expanded_map: &HashMap<String, bool>) -> Vec<TreeNode> {
    let mut sorted: Vec<BeadSummary> = beads.to_vec();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted.dedup_by(|a, b| a.id == b.id);

    let mut roots: Vec<TreeNode> = Vec::new();
    for bead in sorted {
        attach(&mut roots, bead);
    }

    let last = roots.len().saturating_sub(1);
    for (i, root) in roots.iter_mut().enumerate() {
        finish(root, i == last, expanded_map);
    }
    roots
}

fn attach(nodes: &mut Vec<TreeNode>, bead: BeadSummary) {
    // Input is sorted, so any dotted-prefix ancestor is already present and
    // at most one node per level can be an ancestor.
    if let Some(parent) = nodes
        .iter_mut()
        .find(|n| is_child_of(&bead.id, &n.bead.id))
    {
        attach(&mut parent.children, bead);
    } else {
        nodes.push(TreeNode::new(bead));
    }
}

fn finish(node: &mut TreeNode, is_last: bool, expanded_map: &HashMap<String, bool>) {
    node.is_last = is_last;
    node.expanded = match expanded_map.get(&node.bead.id) {
        Some(&flag) => flag,
        None => node.bead.bead_type == BeadType::Epic,
    };
    let last = node.children.len().saturating_sub(1);
    for (i, child) in node.children.iter_mut().enumerate() {
        finish(child, i == last, expanded_map);
    }
}

// --- Flattening ---

/// Flatten the forest depth-first into visible rows. Collapsed nodes suppress
/// their descendants; an expanded node with no children contributes a
/// placeholder row directly beneath itself.
pub fn flatten(roots: &[TreeNode]) -> Vec<FlatNode> {
    let mut out = Vec::new();
    for root in roots {
        flatten_into(root, "", 0, &mut out);
    }
    out
}

fn flatten_into(node: &TreeNode, continuation: &str, depth: usize, out: &mut Vec<FlatNode>) {
    let prefix = if depth == 0 {
        String::new()
    } else if node.is_last {
        format!("{}{}", continuation, TREE_LAST)
    } else {
        format!("{}{}", continuation, TREE_BRANCH)
    };

    out.push(FlatNode {
        kind: FlatKind::Bead(node.bead.clone()),
        prefix,
        depth,
        expanded: node.expanded,
        child_count: node.children.len(),
        open_child_count: open_child_count(node),
        progress: progress(node),
    });

    if !node.expanded {
        return;
    }

    let child_continuation = if depth == 0 {
        String::new()
    } else if node.is_last {
        format!("{}{}", continuation, TREE_SPACE)
    } else {
        format!("{}{}", continuation, TREE_PIPE)
    };

    if node.children.is_empty() {
        out.push(FlatNode {
            kind: FlatKind::Placeholder,
            prefix: format!("{}{}", child_continuation, TREE_LAST),
            depth: depth + 1,
            expanded: false,
            child_count: 0,
            open_child_count: 0,
            progress: Progress::default(),
        });
        return;
    }

    for child in &node.children {
        flatten_into(child, &child_continuation, depth + 1, out);
    }
}

// --- Queries ---

/// Count all descendants of `node` and how many of them are closed.
pub fn progress(node: &TreeNode) -> Progress {
    let mut acc = Progress::default();
    for child in &node.children {
        let below = progress(child);
        acc.total += 1 + below.total;
        acc.closed += below.closed + usize::from(child.bead.closed);
    }
    acc
}

/// Number of direct children still open.
pub fn open_child_count(node: &TreeNode) -> usize {
    node.children.iter().filter(|c| !c.bead.closed).count()
}

/// Find a node anywhere in the forest by bead id.
pub fn find_node<'a>(roots: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
    for root in roots {
        if root.bead.id == id {
            return Some(root);
        }
        if let Some(found) = find_node(&root.children, id) {
            return Some(found);
        }
    }
    None
}

/// Flip the expansion flag on the node with the given id. Returns the new
/// flag, or `None` when the id is not in the forest.
pub fn set_expanded(roots: &mut [TreeNode], id: &str, expanded: bool) -> Option<bool> {
    for root in roots.iter_mut() {
        if root.bead.id == id {
            root.expanded = expanded;
            return Some(expanded);
        }
        if let Some(flag) = set_expanded(&mut root.children, id, expanded) {
            return Some(flag);
        }
    }
    None
}

/// Open direct children of the node with the given id, in tree order.
pub fn open_children(roots: &[TreeNode], id: &str) -> Vec<BeadSummary> {
    match find_node(roots, id) {
        Some(node) => node
            .children
            .iter()
            .filter(|c| !c.bead.closed)
            .map(|c| c.bead.clone())
            .collect(),
        None => Vec::new(),
    }
}
