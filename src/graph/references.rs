//! Reverse reference index
//!
//! Maps a target entity id to the ids of the entities whose reference
//! fields currently hold it. Registration is append-only: one entry per
//! occurrence, no deduplication. Callers keep the index exact by
//! unregistering an entity's previous targets before registering new ones.

use std::collections::HashMap;

use crate::entity::EntityId;

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    incoming: HashMap<EntityId, Vec<EntityId>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source -> target` for every target occurrence
    pub fn register<S: AsRef<str>>(&mut self, source: &str, targets: &[S]) {
        for target in targets {
            self.incoming
                .entry(target.as_ref().to_string())
                .or_default()
                .push(source.to_string());
        }
    }

    /// Remove one `source -> target` entry per target occurrence
    pub fn unregister<S: AsRef<str>>(&mut self, source: &str, targets: &[S]) {
        for target in targets {
            let target = target.as_ref();
            let Some(sources) = self.incoming.get_mut(target) else {
                continue;
            };
            if let Some(pos) = sources.iter().position(|s| s == source) {
                sources.remove(pos);
            }
            if sources.is_empty() {
                self.incoming.remove(target);
            }
        }
    }

    /// Drop every entry from `source` into `target`
    pub fn remove_source(&mut self, target: &str, source: &str) {
        if let Some(sources) = self.incoming.get_mut(target) {
            sources.retain(|s| s != source);
            if sources.is_empty() {
                self.incoming.remove(target);
            }
        }
    }

    /// Ids referencing `target`, in registration order (may repeat)
    pub fn referrers(&self, target: &str) -> &[EntityId] {
        self.incoming
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct ids referencing `target`, first-seen order
    pub fn distinct_referrers(&self, target: &str) -> Vec<EntityId> {
        let mut seen = Vec::new();
        for source in self.referrers(target) {
            if !seen.contains(source) {
                seen.push(source.clone());
            }
        }
        seen
    }

    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.referrers(target).iter().any(|s| s == source)
    }

    /// Number of targets with at least one referrer
    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_append_only() {
        let mut index = ReferenceIndex::new();
        index.register("g1", &["l1"]);
        index.register("g1", &["l1"]);
        assert_eq!(index.referrers("l1"), ["g1", "g1"]);
        assert_eq!(index.distinct_referrers("l1"), vec!["g1".to_string()]);
    }

    #[test]
    fn test_unregister_removes_one_occurrence() {
        let mut index = ReferenceIndex::new();
        index.register("g1", &["l1", "l2"]);
        index.register("g2", &["l1"]);
        index.unregister("g1", &["l1"]);
        assert_eq!(index.referrers("l1"), ["g2"]);
        assert_eq!(index.referrers("l2"), ["g1"]);

        index.unregister("g1", &["l2"]);
        assert!(index.referrers("l2").is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_source() {
        let mut index = ReferenceIndex::new();
        index.register("g1", &["l1", "l1"]);
        index.register("g2", &["l1"]);
        index.remove_source("l1", "g1");
        assert_eq!(index.referrers("l1"), ["g2"]);
        assert!(index.contains_edge("g2", "l1"));
        assert!(!index.contains_edge("g1", "l1"));
    }
}
