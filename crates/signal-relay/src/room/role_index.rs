//! Role -> registered peer ids, maintained on register/unregister.

use super::peer::PeerId;

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub(crate) struct RoleIndex {
    by_role: HashMap<String, BTreeSet<PeerId>>,
}

impl RoleIndex {
    pub(crate) fn insert<'a>(&mut self, id: &PeerId, roles: impl IntoIterator<Item = &'a String>) {
        for role in roles {
            self.by_role
                .entry(role.clone())
                .or_default()
                .insert(id.clone());
        }
    }

    pub(crate) fn remove<'a>(&mut self, id: &PeerId, roles: impl IntoIterator<Item = &'a String>) {
        for role in roles {
            if let Some(ids) = self.by_role.get_mut(role) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_role.remove(role);
                }
            }
        }
    }

    /// Registered peers holding `role`.
    pub(crate) fn peers_with_role<'a>(&'a self, role: &str) -> impl Iterator<Item = &'a PeerId> + 'a {
        self.by_role.get(role).into_iter().flatten()
    }

    #[cfg(test)]
    pub(crate) fn role_count(&self) -> usize {
        self.by_role.len()
    }
}
