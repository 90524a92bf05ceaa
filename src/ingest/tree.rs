//! Parent/child adjacency of a submission's comments
//!
//! Only comment-to-comment edges are kept: a top-level comment (parent is the
//! submission) and a comment whose parent was not fetched contribute no edge.
//! The canonical form is the JSON of a key-sorted map with sorted children, so
//! the digest depends only on the edge set and not on the order comments arrive.

use crate::source::Comment;
use crate::storage::CommentTreeRecord;
use crate::utils::sha256_hex;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentTree {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl CommentTree {
    /// Build the tree from a flat comment list
    pub fn build(comments: &[Comment]) -> Self {
        let fetched: HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        let mut tree = Self::default();
        for comment in comments {
            if let Some(parent) = comment.parent_comment_id() {
                if fetched.contains(parent) {
                    tree.add_edge(parent, &comment.id);
                }
            }
        }
        tree
    }

    /// Record `child` under `parent`; a repeated edge is a no-op
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        self.edges
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    /// Child ids of `parent`, sorted
    pub fn children(&self, parent: &str) -> Vec<&str> {
        self.edges
            .get(parent)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.edges)
    }

    pub fn canonical(&self) -> String {
        self.to_json().to_string()
    }

    /// SHA-256 hex of the canonical serialization
    pub fn digest(&self) -> String {
        sha256_hex(self.canonical().as_bytes())
    }

    pub fn to_record(&self, post_id: &str) -> CommentTreeRecord {
        CommentTreeRecord {
            timestamp: Utc::now(),
            shasum256: self.digest(),
            post_id: post_id.to_string(),
            parent_child_tree: self.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, parent: &str) -> Comment {
        Comment {
            id: id.to_string(),
            parent_id: parent.to_string(),
            link_id: "t3_p1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_skips_post_and_unknown_parents() {
        let comments = vec![
            comment("c1", "t3_p1"),
            comment("c2", "t1_c1"),
            comment("c3", "t1_c1"),
            comment("c4", "t1_c2"),
            comment("c5", "t1_gone"),
        ];
        let tree = CommentTree::build(&comments);

        assert_eq!(tree.children("c1"), ["c2", "c3"]);
        assert_eq!(tree.children("c2"), ["c4"]);
        assert!(tree.children("gone").is_empty());
        assert_eq!(tree.edge_count(), 3);
    }

    #[test]
    fn test_duplicate_comment_yields_single_edge() {
        let comments = vec![
            comment("c1", "t3_p1"),
            comment("c2", "t1_c1"),
            comment("c2", "t1_c1"),
        ];
        let tree = CommentTree::build(&comments);
        assert_eq!(tree.children("c1"), ["c2"]);
    }

    #[test]
    fn test_digest_ignores_parent_insertion_order() {
        let mut a = CommentTree::default();
        a.add_edge("c1", "c2");
        a.add_edge("c5", "c6");

        let mut b = CommentTree::default();
        b.add_edge("c5", "c6");
        b.add_edge("c1", "c2");

        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_ignores_child_insertion_order() {
        let mut first = CommentTree::default();
        first.add_edge("c1", "c2");
        first.add_edge("c1", "c3");

        let mut refetch = CommentTree::default();
        refetch.add_edge("c1", "c3");
        refetch.add_edge("c1", "c2");

        assert_eq!(first, refetch);
        assert_eq!(first.digest(), refetch.digest());
        assert_eq!(first.children("c1"), ["c2", "c3"]);
    }

    #[test]
    fn test_resorted_listing_keeps_digest() {
        // vote changes reorder the comment listing between fetches
        let before = CommentTree::build(&[
            comment("c1", "t3_p1"),
            comment("c2", "t1_c1"),
            comment("c3", "t1_c1"),
        ]);
        let after = CommentTree::build(&[
            comment("c1", "t3_p1"),
            comment("c3", "t1_c1"),
            comment("c2", "t1_c1"),
        ]);

        assert_eq!(before.digest(), after.digest());
        assert_eq!(
            before.to_json(),
            serde_json::json!({ "c1": ["c2", "c3"] })
        );
    }

    #[test]
    fn test_digest_changes_with_edges() {
        let mut tree = CommentTree::default();
        tree.add_edge("c1", "c2");
        let before = tree.digest();

        tree.add_edge("c1", "c3");
        let added = tree.digest();
        assert_ne!(before, added);

        let mut removed = CommentTree::default();
        removed.add_edge("c1", "c3");
        assert_ne!(removed.digest(), added);
        assert_ne!(removed.digest(), before);
    }

    #[test]
    fn test_empty_tree_record() {
        let tree = CommentTree::build(&[comment("c1", "t3_p1")]);
        assert!(tree.is_empty());

        let record = tree.to_record("p1");
        assert_eq!(record.post_id, "p1");
        assert_eq!(record.parent_child_tree, serde_json::json!({}));
        assert_eq!(record.shasum256, sha256_hex(b"{}"));
    }
}
