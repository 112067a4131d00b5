mod common;

use std::collections::HashMap;

use beadboard::tree::{
    build, find_dot_parent_id, find_node, flatten, is_child_of, merge_bead_lists, open_children,
    progress, set_expanded,
};
use beadboard::types::BeadSummary;

use common::{make_bead, make_closed, make_epic};

fn expand_all(ids: &[&str]) -> HashMap<String, bool> {
    ids.iter().map(|id| (id.to_string(), true)).collect()
}

fn flat_ids(beads: &[BeadSummary], expanded: &HashMap<String, bool>) -> Vec<String> {
    flatten(&build(beads, expanded))
        .iter()
        .filter_map(|f| f.bead().map(|b| b.id.clone()))
        .collect()
}

// --- Flatten shape ---

#[test]
fn flatten_matches_depth_first_order_with_box_prefixes() {
    let ids = ["demo-1", "demo-1.1", "demo-1.1.1", "demo-1.1.2", "demo-1.2"];
    let beads: Vec<BeadSummary> = ids.iter().map(|id| make_bead(id)).collect();
    let flat = flatten(&build(&beads, &expand_all(&ids)));

    let order: Vec<&str> = flat
        .iter()
        .filter_map(|f| f.bead().map(|b| b.id.as_str()))
        .collect();
    assert_eq!(
        order,
        vec!["demo-1", "demo-1.1", "demo-1.1.1", "demo-1.1.2", "demo-1.2"]
    );

    assert_eq!(flat[0].prefix, "");
    assert!(flat[1].prefix.ends_with("├── "));
    assert!(flat[2].prefix.ends_with("├── "));
    assert!(flat[3].prefix.ends_with("└── "));
    assert!(flat[4].prefix.ends_with("└── "));
    assert_eq!(flat[0].depth, 0);
    assert_eq!(flat[2].depth, 2);
}

#[test]
fn input_order_does_not_matter() {
    let ids = ["demo-1", "demo-1.1", "demo-1.2", "demo-2"];
    let sorted: Vec<BeadSummary> = ids.iter().map(|id| make_bead(id)).collect();
    let mut shuffled = sorted.clone();
    shuffled.reverse();
    let expanded = expand_all(&ids);
    assert_eq!(flat_ids(&sorted, &expanded), flat_ids(&shuffled, &expanded));
}

#[test]
fn prefix_overlap_without_dot_is_unrelated() {
    let beads = vec![make_bead("demo-1"), make_bead("demo-10")];
    let roots = build(&beads, &HashMap::new());
    assert_eq!(roots.len(), 2);
    assert!(!is_child_of("demo-10", "demo-1"));
}

#[test]
fn duplicate_ids_collapse_to_one_node() {
    let beads = vec![make_bead("demo-1"), make_bead("demo-1")];
    let flat = flatten(&build(&beads, &HashMap::new()));
    assert_eq!(flat.len(), 1);
}

// --- Hierarchy attachment ---

#[test]
fn nodes_attach_to_longest_present_dotted_prefix() {
    // demo-1.1 absent: demo-1.1.1 must attach to demo-1, not become a root.
    let beads = vec![make_bead("demo-1"), make_bead("demo-1.1.1"), make_bead("demo-1.2")];
    let roots = build(&beads, &expand_all(&["demo-1"]));
    assert_eq!(roots.len(), 1);
    let children: Vec<&str> = roots[0]
        .children
        .iter()
        .map(|c| c.bead.id.as_str())
        .collect();
    assert_eq!(children, vec!["demo-1.1.1", "demo-1.2"]);
}

#[test]
fn orphans_become_roots_sorted_lexicographically() {
    let beads = vec![make_bead("zz-9.1"), make_bead("aa-1.5"), make_bead("mm-2")];
    let roots = build(&beads, &HashMap::new());
    let ids: Vec<&str> = roots.iter().map(|r| r.bead.id.as_str()).collect();
    assert_eq!(ids, vec!["aa-1.5", "mm-2", "zz-9.1"]);
    assert!(roots[2].is_last);
    assert!(!roots[0].is_last);
}

#[test]
fn dot_parent_id_text() {
    assert_eq!(find_dot_parent_id("demo-1.1.2"), "demo-1.1");
    assert_eq!(find_dot_parent_id("demo-1.1"), "demo-1");
    assert_eq!(find_dot_parent_id("demo-1"), "");
}

// --- Expansion ---

#[test]
fn default_expansion_epics_open_others_shut() {
    let beads = vec![
        make_epic("demo-1"),
        make_bead("demo-1.1"),
        make_bead("demo-2"),
        make_bead("demo-2.1"),
    ];
    let flat = flatten(&build(&beads, &HashMap::new()));
    let ids: Vec<&str> = flat
        .iter()
        .filter_map(|f| f.bead().map(|b| b.id.as_str()))
        .collect();
    // The epic shows its child; the task parent hides its own.
    assert_eq!(ids, vec!["demo-1", "demo-1.1", "demo-2"]);
}

#[test]
fn expansion_map_wins_over_defaults() {
    let beads = vec![make_epic("demo-1"), make_bead("demo-1.1")];
    let mut map = HashMap::new();
    map.insert("demo-1".to_string(), false);
    let flat = flatten(&build(&beads, &map));
    assert_eq!(flat.len(), 1);
}

#[test]
fn placeholder_row_under_expanded_childless_node() {
    let flat = flatten(&build(&[make_epic("demo-1")], &HashMap::new()));
    assert_eq!(flat.len(), 2);
    assert!(flat[1].is_placeholder());
    assert_eq!(flat[1].depth, 1);
}

#[test]
fn set_expanded_toggles_in_place() {
    let beads = vec![make_bead("demo-1"), make_bead("demo-1.1")];
    let mut roots = build(&beads, &HashMap::new());
    assert_eq!(flatten(&roots).len(), 1);
    assert_eq!(set_expanded(&mut roots, "demo-1", true), Some(true));
    assert_eq!(flatten(&roots).len(), 2);
    assert_eq!(set_expanded(&mut roots, "missing", true), None);
}

// --- Properties over a larger forest ---

#[test]
fn every_bead_appears_at_most_once_and_only_under_expanded_ancestors() {
    let ids = [
        "a-1", "a-1.1", "a-1.1.1", "a-1.2", "a-2", "a-2.1", "a-2.2", "b-1", "b-1.1",
    ];
    let beads: Vec<BeadSummary> = ids.iter().map(|id| make_bead(id)).collect();

    // Partially expanded: a-1 open, a-1.1 shut, a-2 shut, b-1 open.
    let mut map = HashMap::new();
    map.insert("a-1".to_string(), true);
    map.insert("a-1.1".to_string(), false);
    map.insert("a-2".to_string(), false);
    map.insert("b-1".to_string(), true);

    let visible = flat_ids(&beads, &map);
    let unique: std::collections::HashSet<&String> = visible.iter().collect();
    assert_eq!(unique.len(), visible.len(), "no bead may appear twice");
    assert_eq!(
        visible,
        vec!["a-1", "a-1.1", "a-1.2", "a-2", "b-1", "b-1.1"]
    );
}

#[test]
fn progress_totals_are_consistent() {
    let beads = vec![
        make_bead("a-1"),
        make_bead("a-1.1"),
        make_closed("a-1.1.1"),
        make_closed("a-1.2"),
        make_bead("a-1.3"),
    ];
    let roots = build(&beads, &HashMap::new());
    let root = &roots[0];

    let p = progress(root);
    assert_eq!(p.total, 4);
    assert_eq!(p.closed, 2);
    assert!(p.closed <= p.total);

    // total = Σ over children of (1 + child.total)
    let sum: usize = root
        .children
        .iter()
        .map(|c| 1 + progress(c).total)
        .sum();
    assert_eq!(p.total, sum);
}

// --- Queries ---

#[test]
fn open_children_skips_closed_and_keeps_order() {
    let beads = vec![
        make_feature_root(),
        make_bead("f-1.1"),
        make_closed("f-1.2"),
        make_bead("f-1.3"),
    ];
    let roots = build(&beads, &HashMap::new());
    let children = open_children(&roots, "f-1");
    let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["f-1.1", "f-1.3"]);
    assert!(open_children(&roots, "missing").is_empty());
}

fn make_feature_root() -> BeadSummary {
    common::make_feature("f-1")
}

#[test]
fn find_node_descends_the_forest() {
    let beads = vec![make_bead("a-1"), make_bead("a-1.1"), make_bead("b-2")];
    let roots = build(&beads, &HashMap::new());
    assert_eq!(find_node(&roots, "a-1.1").unwrap().bead.id, "a-1.1");
    assert!(find_node(&roots, "c-3").is_none());
}

#[test]
fn merge_lists_ready_wins_collisions() {
    let merged = merge_bead_lists(
        vec![make_bead("a-1")],
        vec![make_closed("a-1"), make_closed("a-2")],
    );
    assert_eq!(merged.len(), 2);
    let a1 = merged.iter().find(|b| b.id == "a-1").unwrap();
    assert!(!a1.closed);
}
