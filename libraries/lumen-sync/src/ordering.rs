//! Dependency ordering of media types
//!
//! Handlers declare which media types must be synchronized before their
//! own (an episode needs its season, a season needs its show). The order
//! is a depth-first postorder over the media types in registration order,
//! so unrelated types keep the order in which they were registered.
//!
//! Cycles are not expected between handler declarations and are not
//! treated as an error. A back edge found during traversal is logged and
//! skipped, which terminates the traversal instead of looping; the
//! resulting order for the types on the cycle is then unspecified.

use lumen_core::MediaType;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Total order over media types such that dependencies come first
#[derive(Debug, Clone, Default)]
pub struct DependencyOrder {
    /// Media types in registration order
    nodes: Vec<MediaType>,
    /// `A -> [B, ..]` means A depends on B
    dependencies: HashMap<MediaType, Vec<MediaType>>,
    /// Cached full order
    order: Vec<MediaType>,
}

impl DependencyOrder {
    /// Create an empty order
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a media type with its dependencies and re-sort
    pub fn insert(
        &mut self,
        media_type: MediaType,
        dependencies: impl IntoIterator<Item = MediaType>,
    ) {
        if !self.nodes.contains(&media_type) {
            self.nodes.push(media_type.clone());
        }

        let edges = self.dependencies.entry(media_type).or_default();
        for dependency in dependencies {
            if !edges.contains(&dependency) {
                edges.push(dependency);
            }
        }

        self.order = topological_sort(&self.nodes, &self.dependencies);
    }

    /// Media types with every dependency before its dependents
    pub fn order(&self) -> &[MediaType] {
        &self.order
    }

    /// The exact reverse of [`order`](Self::order), used for removal
    pub fn reverse_order(&self) -> Vec<MediaType> {
        self.order.iter().rev().cloned().collect()
    }

    /// Position of a media type in the order
    pub fn position(&self, media_type: &MediaType) -> Option<usize> {
        self.order.iter().position(|m| m == media_type)
    }

    /// Sort media types into dependency order.
    ///
    /// Unknown media types go last, keeping their relative order.
    pub fn sort(&self, media_types: &mut [MediaType]) {
        media_types.sort_by_key(|m| self.position(m).unwrap_or(usize::MAX));
    }

    /// Sort media types into reverse dependency order (dependents first)
    pub fn sort_reverse(&self, media_types: &mut [MediaType]) {
        self.sort(media_types);
        media_types.reverse();
    }

    /// Whether `media_type` depends on `dependency`, directly or transitively
    pub fn depends_on(&self, media_type: &MediaType, dependency: &MediaType) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![media_type];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(edges) = self.dependencies.get(current) {
                for edge in edges {
                    if edge == dependency {
                        return true;
                    }
                    stack.push(edge);
                }
            }
        }

        false
    }

    /// Every known media type depending on `media_type`, in dependency order
    pub fn dependents_of(&self, media_type: &MediaType) -> Vec<MediaType> {
        self.order
            .iter()
            .filter(|candidate| *candidate != media_type && self.depends_on(candidate, media_type))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Depth-first postorder topological sort
fn topological_sort(
    nodes: &[MediaType],
    dependencies: &HashMap<MediaType, Vec<MediaType>>,
) -> Vec<MediaType> {
    let mut marks: HashMap<MediaType, Mark> = HashMap::new();
    let mut order = Vec::with_capacity(nodes.len());

    for node in nodes {
        visit(node, dependencies, &mut marks, &mut order);
    }

    order
}

fn visit(
    node: &MediaType,
    dependencies: &HashMap<MediaType, Vec<MediaType>>,
    marks: &mut HashMap<MediaType, Mark>,
    order: &mut Vec<MediaType>,
) {
    match marks.get(node) {
        Some(Mark::Done) => return,
        Some(Mark::InProgress) => {
            warn!("Dependency cycle through media type {}, ignoring edge", node);
            return;
        }
        None => {}
    }

    marks.insert(node.clone(), Mark::InProgress);

    if let Some(edges) = dependencies.get(node) {
        for dependency in edges {
            visit(dependency, dependencies, marks, order);
        }
    }

    marks.insert(node.clone(), Mark::Done);
    order.push(node.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mt(tag: &str) -> MediaType {
        MediaType::new(tag)
    }

    fn tv_order() -> DependencyOrder {
        let mut order = DependencyOrder::new();
        order.insert(mt("episode"), [mt("season")]);
        order.insert(mt("movie"), []);
        order.insert(mt("season"), [mt("tvshow")]);
        order.insert(mt("tvshow"), []);
        order
    }

    #[test]
    fn test_dependencies_come_first() {
        let order = tv_order();
        let pos = |tag: &str| order.position(&mt(tag)).unwrap();

        assert!(pos("tvshow") < pos("season"));
        assert!(pos("season") < pos("episode"));
        assert_eq!(order.order().len(), 4);
    }

    #[test]
    fn test_unrelated_types_keep_registration_order() {
        let mut order = DependencyOrder::new();
        order.insert(mt("song"), []);
        order.insert(mt("movie"), []);
        order.insert(mt("musicvideo"), []);

        assert_eq!(order.order(), &[mt("song"), mt("movie"), mt("musicvideo")]);
    }

    #[test]
    fn test_reverse_order_is_exact_reverse() {
        let order = tv_order();
        let mut reversed = order.reverse_order();
        reversed.reverse();
        assert_eq!(reversed, order.order());
    }

    #[test]
    fn test_sort_puts_unknown_last() {
        let order = tv_order();
        let mut types = vec![mt("episode"), mt("unknown"), mt("tvshow"), mt("season")];
        order.sort(&mut types);
        assert_eq!(types, vec![mt("tvshow"), mt("season"), mt("episode"), mt("unknown")]);

        order.sort_reverse(&mut types);
        assert_eq!(types[0], mt("unknown"));
        assert_eq!(types[1], mt("episode"));
    }

    #[test]
    fn test_transitive_dependents() {
        let order = tv_order();
        assert!(order.depends_on(&mt("episode"), &mt("tvshow")));
        assert!(!order.depends_on(&mt("tvshow"), &mt("episode")));
        assert_eq!(order.dependents_of(&mt("tvshow")), vec![mt("season"), mt("episode")]);
        assert!(order.dependents_of(&mt("movie")).is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let mut order = DependencyOrder::new();
        order.insert(mt("a"), [mt("b")]);
        order.insert(mt("b"), [mt("a")]);

        assert_eq!(order.order().len(), 2);
        assert!(order.depends_on(&mt("a"), &mt("b")));
    }
}
