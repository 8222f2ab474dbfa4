//! Symmetric adjacency over role names.

use std::collections::{BTreeSet, HashMap, HashSet};

/// Canonical form of a role name: surrounding whitespace trimmed. Blank
/// names have no canonical form.
#[must_use]
pub fn normalize_role(role: &str) -> Option<&str> {
    let role = role.trim();
    (!role.is_empty()).then_some(role)
}

/// Which pairs of roles may signal each other.
///
/// Symmetry is maintained by `connect`/`disconnect`; every edge is stored in
/// both directions. A role may be connected to itself.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    edges: HashMap<String, HashSet<String>>,
}

impl RoleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the edge `a <-> b`. Returns `true` if the edge was not present.
    ///
    /// Names are normalized with [`normalize_role`]; blank names are ignored.
    pub fn connect(&mut self, a: &str, b: &str) -> bool {
        let (Some(a), Some(b)) = (normalize_role(a), normalize_role(b)) else {
            return false;
        };
        let added = self
            .edges
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.edges
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
        added
    }

    /// Remove the edge `a <-> b`. Returns `true` if the edge was present.
    pub fn disconnect(&mut self, a: &str, b: &str) -> bool {
        let (Some(a), Some(b)) = (normalize_role(a), normalize_role(b)) else {
            return false;
        };
        let removed = self.remove_half(a, b);
        self.remove_half(b, a);
        removed
    }

    /// Whether `a` and `b` are connected. Unknown or blank names are never
    /// connected.
    #[must_use]
    pub fn are_connected(&self, a: &str, b: &str) -> bool {
        let (Some(a), Some(b)) = (normalize_role(a), normalize_role(b)) else {
            return false;
        };
        self.edges.get(a).is_some_and(|set| set.contains(b))
    }

    /// Roles connected to `role`.
    pub fn neighbors<'a>(&'a self, role: &str) -> impl Iterator<Item = &'a str> + 'a {
        normalize_role(role)
            .and_then(|role| self.edges.get(role))
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Every edge once, as an ordered `(low, high)` pair.
    #[must_use]
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        self.edges
            .iter()
            .flat_map(|(a, set)| {
                set.iter().map(move |b| {
                    if a <= b {
                        (a.clone(), b.clone())
                    } else {
                        (b.clone(), a.clone())
                    }
                })
            })
            .collect()
    }

    fn remove_half(&mut self, from: &str, to: &str) -> bool {
        let Some(set) = self.edges.get_mut(from) else {
            return false;
        };
        let removed = set.remove(to);
        if set.is_empty() {
            self.edges.remove(from);
        }
        removed
    }
}
