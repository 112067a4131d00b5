use std::collections::HashMap;

use crate::msg::Key;
use crate::tree::{self, FlatNode, TreeNode, EMPTY_CHILDREN_LABEL};
use crate::types::{BeadSummary, BeadType};

/// Intent emitted by a browse transition for the root controller to act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrowseEmit {
    None,
    /// Ask for the pre-dispatch confirmation screen.
    Confirm {
        id: String,
        bead_type: BeadType,
        title: String,
    },
    /// Reload the bead lists.
    Refresh,
}

/// Left-pane browser over the bead forest.
///
/// The tree is rebuilt on every refresh; expansion decisions live in
/// `expanded_ids` keyed by bead id so they survive rebuilds. Stale keys are
/// pruned on each rebuild.
#[derive(Debug, Default)]
pub struct BrowseState {
    pub roots: Vec<TreeNode>,
    pub flat: Vec<FlatNode>,
    pub cursor: usize,
    pub loading: bool,
    pub err: Option<String>,
    pub expanded_ids: HashMap<String, bool>,
}

impl BrowseState {
    pub fn new() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    // --- List arrival ---

    /// Rebuild the forest from a fresh merged bead list.
    pub fn set_beads(&mut self, beads: Vec<BeadSummary>) {
        let present: std::collections::HashSet<&str> =
            beads.iter().map(|b| b.id.as_str()).collect();
        self.expanded_ids.retain(|id, _| present.contains(id.as_str()));

        self.roots = tree::build(&beads, &self.expanded_ids);
        self.flat = tree::flatten(&self.roots);
        self.clamp_cursor();
        self.loading = false;
        self.err = None;
    }

    pub fn set_error(&mut self, err: String) {
        self.loading = false;
        self.err = Some(err);
    }

    // --- Selection ---

    pub fn selected(&self) -> Option<&FlatNode> {
        self.flat.get(self.cursor)
    }

    pub fn selected_bead(&self) -> Option<&BeadSummary> {
        self.selected().and_then(|f| f.bead())
    }

    /// Move the cursor onto the row for `id`. Returns false when the id is
    /// not currently visible.
    pub fn select_id(&mut self, id: &str) -> bool {
        match self
            .flat
            .iter()
            .position(|f| f.bead().is_some_and(|b| b.id == id))
        {
            Some(idx) => {
                self.cursor = idx;
                true
            }
            None => false,
        }
    }

    fn clamp_cursor(&mut self) {
        if self.flat.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.flat.len() {
            self.cursor = self.flat.len() - 1;
        }
    }

    // --- Key handling ---

    /// Apply one key. Keys are ignored while loading.
    pub fn handle_key(&mut self, key: Key) -> BrowseEmit {
        if self.loading {
            return BrowseEmit::None;
        }
        match key {
            Key::Up | Key::Char('k') => {
                self.move_cursor(-1);
                BrowseEmit::None
            }
            Key::Down | Key::Char('j') => {
                self.move_cursor(1);
                BrowseEmit::None
            }
            Key::Right | Key::Char('l') => {
                self.toggle_expand();
                BrowseEmit::None
            }
            Key::Left | Key::Char('h') => {
                self.jump_to_parent();
                BrowseEmit::None
            }
            Key::Enter => self.request_confirm(),
            Key::Char('r') => {
                self.loading = true;
                self.err = None;
                BrowseEmit::Refresh
            }
            _ => BrowseEmit::None,
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.flat.len();
        if len == 0 {
            return;
        }
        let len = len as isize;
        self.cursor = ((self.cursor as isize + delta % len + len) % len) as usize;
    }

    /// Toggle expansion of the selected node. Expanding a node with at least
    /// one open child advances the cursor onto its first child.
    fn toggle_expand(&mut self) {
        let Some(row) = self.selected() else {
            return;
        };
        if !row.has_children() {
            return;
        }
        let (id, open_children) = match row.bead() {
            Some(bead) => (bead.id.clone(), row.open_child_count),
            None => return,
        };

        let now_expanded = !row.expanded;
        tree::set_expanded(&mut self.roots, &id, now_expanded);
        self.expanded_ids.insert(id, now_expanded);
        self.flat = tree::flatten(&self.roots);
        self.clamp_cursor();

        if now_expanded && open_children > 0 && self.cursor + 1 < self.flat.len() {
            self.cursor += 1;
        }
    }

    /// Move to the nearest visible ancestor; no-op at a root.
    fn jump_to_parent(&mut self) {
        let Some(row) = self.selected() else {
            return;
        };
        if row.depth == 0 {
            return;
        }
        let depth = row.depth;
        for idx in (0..self.cursor).rev() {
            if self.flat[idx].depth < depth {
                self.cursor = idx;
                return;
            }
        }
    }

    fn request_confirm(&self) -> BrowseEmit {
        let Some(bead) = self.selected_bead() else {
            return BrowseEmit::None;
        };
        if bead.closed {
            return BrowseEmit::None;
        }
        BrowseEmit::Confirm {
            id: bead.id.clone(),
            bead_type: bead.bead_type,
            title: bead.title.clone(),
        }
    }

    // --- View ---

    pub fn view(&self) -> String {
        if self.loading {
            return "Loading beads…".to_string();
        }
        if let Some(err) = &self.err {
            return format!("Error: {}\n\npress r to retry", err);
        }
        if self.flat.is_empty() {
            return "No beads found.\n\npress r to refresh".to_string();
        }

        let mut lines = Vec::with_capacity(self.flat.len());
        for (i, row) in self.flat.iter().enumerate() {
            let marker = if i == self.cursor { "> " } else { "  " };
            lines.push(format!("{}{}{}", marker, row.prefix, render_row(row)));
        }
        lines.join("\n")
    }
}

fn render_row(row: &FlatNode) -> String {
    let Some(bead) = row.bead() else {
        return EMPTY_CHILDREN_LABEL.to_string();
    };

    let glyph = if row.has_children() {
        if row.expanded {
            "▼"
        } else {
            "▶"
        }
    } else {
        "•"
    };

    let mut line = format!("{} {}  {}", glyph, bead.id, bead.title);
    if row.has_children() {
        line.push_str(&format!(" [{}]", row.child_count));
    }
    if bead.closed {
        line.push_str(" ✓");
    } else {
        line.push_str(&format!(" P{}", bead.priority));
    }
    if row.has_children() {
        line.push_str(&format!(" {}/{}", row.progress.closed, row.progress.total));
    }
    line
}
