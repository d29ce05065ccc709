//! Membership bookkeeping for a single projection.

use std::collections::{BTreeMap, BTreeSet};

use fleetgrid_core::UnitId;

use crate::grid::GridMember;

/// Members held by one projection.
///
/// A member picked for eviction stays here until the provider reports it
/// completed, but is flagged *evicting*: it no longer counts toward the
/// projection's desired shape and is never picked a second time.
///
/// A member may also carry an assigned location. It then counts toward that
/// location instead of the one it physically landed on.
#[derive(Debug, Clone, Default)]
pub struct MemberSet {
    members: BTreeMap<UnitId, GridMember>,
    evicting: BTreeSet<UnitId>,
    assigned: BTreeMap<UnitId, String>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member. Returns false if it was already held.
    pub fn insert(&mut self, member: GridMember) -> bool {
        if self.members.contains_key(member.id()) {
            return false;
        }
        self.members.insert(member.id().to_string(), member);
        true
    }

    /// Insert a member counted against `location` rather than its own.
    pub fn insert_assigned(&mut self, member: GridMember, location: Option<String>) -> bool {
        let id = member.id().to_string();
        if !self.insert(member) {
            return false;
        }
        if let Some(location) = location {
            self.assigned.insert(id, location);
        }
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<GridMember> {
        self.evicting.remove(id);
        self.assigned.remove(id);
        self.members.remove(id)
    }

    pub fn assigned_location(&self, id: &str) -> Option<&str> {
        self.assigned.get(id).map(String::as_str)
    }

    /// The location `member` counts toward: its assigned one, else `key`.
    pub fn location_of<'a, F>(&'a self, member: &'a GridMember, key: &F) -> &'a str
    where
        F: Fn(&GridMember) -> &str,
    {
        self.assigned_location(member.id())
            .unwrap_or_else(|| key(member))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&GridMember> {
        self.members.get(id)
    }

    /// Every held member, evicting ones included.
    pub fn all(&self) -> impl Iterator<Item = &GridMember> {
        self.members.values()
    }

    /// Held members that still count toward the desired shape.
    pub fn active(&self) -> impl Iterator<Item = &GridMember> {
        self.members
            .values()
            .filter(|m| !self.evicting.contains(m.id()))
    }

    /// Active members, most recently added first.
    pub fn active_newest_first(&self) -> Vec<&GridMember> {
        let mut active: Vec<&GridMember> = self.active().collect();
        active.sort_by(|a, b| b.seq().cmp(&a.seq()));
        active
    }

    /// Active members grouped by location, each group newest first.
    pub fn group_active_by<F>(&self, key: F) -> BTreeMap<String, Vec<&GridMember>>
    where
        F: Fn(&GridMember) -> &str,
    {
        let mut groups: BTreeMap<String, Vec<&GridMember>> = BTreeMap::new();
        for member in self.active_newest_first() {
            groups
                .entry(self.location_of(member, &key).to_string())
                .or_default()
                .push(member);
        }
        groups
    }

    /// Number of active members counting toward location `value`.
    pub fn count_active_where<F>(&self, key: F, value: &str) -> usize
    where
        F: Fn(&GridMember) -> &str,
    {
        self.active()
            .filter(|m| self.location_of(m, &key) == value)
            .count()
    }

    /// Flag a held member as evicting. Returns false if not held.
    pub fn mark_evicting(&mut self, id: &str) -> bool {
        if !self.members.contains_key(id) {
            return false;
        }
        self.evicting.insert(id.to_string())
    }

    pub fn clear_evicting(&mut self, id: &str) -> bool {
        self.evicting.remove(id)
    }

    pub fn is_evicting(&self, id: &str) -> bool {
        self.evicting.contains(id)
    }

    pub fn ids(&self) -> Vec<UnitId> {
        self.members.keys().cloned().collect()
    }

    /// Held members, evicting ones included.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn active_len(&self) -> usize {
        self.members.len() - self.evicting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgrid_core::ResourceUnit;

    fn member(id: &str, node: &str, seq: u64) -> GridMember {
        GridMember::new(ResourceUnit::new(id, node), seq)
    }

    #[test]
    fn evicting_members_drop_out_of_active_set() {
        let mut set = MemberSet::new();
        set.insert(member("a", "h1", 0));
        set.insert(member("b", "h1", 1));

        assert!(set.mark_evicting("b"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.active_len(), 1);
        assert_eq!(set.active().map(|m| m.id()).collect::<Vec<_>>(), vec!["a"]);

        assert!(set.clear_evicting("b"));
        assert_eq!(set.active_len(), 2);
    }

    #[test]
    fn cannot_mark_unheld_member() {
        let mut set = MemberSet::new();
        assert!(!set.mark_evicting("ghost"));
        assert_eq!(set.active_len(), 0);
    }

    #[test]
    fn removal_clears_eviction_flag() {
        let mut set = MemberSet::new();
        set.insert(member("a", "h1", 0));
        set.mark_evicting("a");
        assert!(set.remove("a").is_some());
        assert!(!set.is_evicting("a"));
        assert_eq!(set.active_len(), 0);
    }

    #[test]
    fn groups_are_sorted_newest_first() {
        let mut set = MemberSet::new();
        set.insert(member("a", "h1", 0));
        set.insert(member("b", "h2", 1));
        set.insert(member("c", "h1", 2));

        let groups = set.group_active_by(GridMember::node);
        let h1: Vec<&str> = groups["h1"].iter().map(|m| m.id()).collect();
        assert_eq!(h1, vec!["c", "a"]);
        assert_eq!(groups["h2"].len(), 1);
        assert_eq!(set.count_active_where(GridMember::node, "h1"), 2);
    }

    #[test]
    fn assigned_location_overrides_physical_one() {
        let mut set = MemberSet::new();
        set.insert(member("a", "h1", 0));
        assert!(set.insert_assigned(member("b", "h2", 1), Some("h1".into())));

        assert_eq!(set.count_active_where(GridMember::node, "h1"), 2);
        assert_eq!(set.count_active_where(GridMember::node, "h2"), 0);
        let groups = set.group_active_by(GridMember::node);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["h1"].len(), 2);

        set.remove("b");
        assert_eq!(set.assigned_location("b"), None);
    }
}
