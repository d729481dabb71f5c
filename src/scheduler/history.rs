use indexmap::IndexMap;

use crate::identity::Owner;
use crate::scheduler::job::{HistoryEntry, JobId};

/// Pagination parameters for history reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Return only this entry (if the caller owns it).
    pub job_id: Option<JobId>,
    pub max_items: Option<usize>,
    /// Start index in the caller's history. Negative with `max_items` set
    /// means "the last `max_items` entries".
    pub offset: i64,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            job_id: None,
            max_items: None,
            offset: -1,
        }
    }
}

impl HistoryQuery {
    pub fn single(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            ..Default::default()
        }
    }

    pub fn page(max_items: Option<usize>, offset: i64) -> Self {
        Self {
            job_id: None,
            max_items,
            offset,
        }
    }
}

/// Completed jobs in insertion order, bounded by `max_size`.
///
/// Eviction is strictly oldest-inserted first, regardless of owner or
/// priority.
#[derive(Debug)]
pub struct History {
    entries: IndexMap<JobId, HistoryEntry>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            max_size: max_size.max(1),
        }
    }

    /// Insert `entry`, evicting the oldest records first if needed.
    /// Returns the ids that were evicted.
    pub fn insert(&mut self, entry: HistoryEntry) -> Vec<JobId> {
        let mut evicted = Vec::new();
        if !self.entries.contains_key(&entry.job.id) {
            while self.entries.len() >= self.max_size {
                match self.entries.shift_remove_index(0) {
                    Some((id, _)) => evicted.push(id),
                    None => break,
                }
            }
        }
        self.entries.insert(entry.job.id, entry);
        assert!(
            self.entries.len() <= self.max_size,
            "history holds {} entries, above its maximum of {}",
            self.entries.len(),
            self.max_size
        );
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn owner_of(&self, id: &JobId) -> Option<&Owner> {
        self.entries.get(id).map(|entry| &entry.owner)
    }

    /// Owner-filtered read with the host's pagination rules.
    pub fn query(&self, owner: &Owner, query: &HistoryQuery) -> IndexMap<JobId, HistoryEntry> {
        if let Some(id) = query.job_id {
            return self
                .entries
                .get(&id)
                .filter(|entry| &entry.owner == owner)
                .map(|entry| IndexMap::from([(id, entry.clone())]))
                .unwrap_or_default();
        }

        let owned: Vec<(&JobId, &HistoryEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| &entry.owner == owner)
            .collect();

        let mut offset = query.offset;
        if offset < 0 {
            if let Some(max) = query.max_items {
                offset = owned.len() as i64 - max as i64;
            }
        }
        let start = offset.max(0) as usize;
        let take = query.max_items.unwrap_or(usize::MAX);

        owned
            .into_iter()
            .skip(start)
            .take(take)
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    /// Drop every record belonging to `owner`. Returns how many were removed.
    pub fn wipe(&mut self, owner: &Owner) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| &entry.owner != owner);
        before - self.entries.len()
    }

    /// Remove one record if it belongs to `owner`.
    pub fn remove(&mut self, owner: &Owner, id: &JobId) -> bool {
        match self.entries.get(id) {
            Some(entry) if &entry.owner == owner => self.entries.shift_remove(id).is_some(),
            _ => false,
        }
    }

    /// Unfiltered iteration for privileged internal code.
    pub fn iter(&self) -> impl Iterator<Item = (&JobId, &HistoryEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserId;
    use crate::scheduler::job::{ExecutionStatus, JobDescriptor, NewJob};
    use chrono::Utc;
    use serde_json::json;

    fn user(name: &str) -> Owner {
        Owner::User(UserId::new(name).unwrap())
    }

    fn entry(owner: &Owner, seq: u64) -> HistoryEntry {
        HistoryEntry {
            job: JobDescriptor::from_new(NewJob::new(seq as i64, json!({ "n": seq })), seq),
            outputs: json!({}),
            status: Some(ExecutionStatus::success()),
            owner: owner.clone(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut history = History::new(2);
        let a = entry(&user("a"), 1);
        let b = entry(&user("a"), 2);
        let c = entry(&user("b"), 3);
        let a_id = a.job.id;

        assert!(history.insert(a).is_empty());
        assert!(history.insert(b).is_empty());
        assert_eq!(history.insert(c), vec![a_id]);
        assert_eq!(history.len(), 2);
        assert!(!history.contains(&a_id));
    }

    #[test]
    fn reinserting_same_id_does_not_evict() {
        let mut history = History::new(2);
        let a = entry(&user("a"), 1);
        let b = entry(&user("a"), 2);
        history.insert(a.clone());
        history.insert(b);
        assert!(history.insert(a).is_empty());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn zero_max_is_clamped() {
        let mut history = History::new(0);
        assert_eq!(history.max_size(), 1);
        history.insert(entry(&Owner::Public, 1));
        history.insert(entry(&Owner::Public, 2));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn query_filters_then_paginates() {
        let alice = user("alice");
        let bob = user("bob");
        let mut history = History::new(100);
        let mut alice_ids = Vec::new();
        for i in 0..5 {
            let e = entry(&alice, i);
            alice_ids.push(e.job.id);
            history.insert(e);
            history.insert(entry(&bob, 100 + i));
        }

        let all = history.query(&alice, &HistoryQuery::default());
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), alice_ids);

        let last_two = history.query(&alice, &HistoryQuery::page(Some(2), -1));
        assert_eq!(
            last_two.keys().copied().collect::<Vec<_>>(),
            alice_ids[3..].to_vec()
        );

        let middle = history.query(&alice, &HistoryQuery::page(Some(2), 1));
        assert_eq!(
            middle.keys().copied().collect::<Vec<_>>(),
            alice_ids[1..3].to_vec()
        );

        let more_than_exist = history.query(&alice, &HistoryQuery::page(Some(50), -1));
        assert_eq!(more_than_exist.len(), 5);
    }

    #[test]
    fn single_lookup_respects_owner() {
        let mut history = History::new(10);
        let e = entry(&user("alice"), 1);
        let id = e.job.id;
        history.insert(e);

        assert_eq!(history.query(&user("alice"), &HistoryQuery::single(id)).len(), 1);
        assert!(history.query(&user("bob"), &HistoryQuery::single(id)).is_empty());
    }

    #[test]
    fn wipe_and_remove_are_owner_scoped() {
        let mut history = History::new(10);
        let a = entry(&user("alice"), 1);
        let b = entry(&user("bob"), 2);
        let b_id = b.job.id;
        history.insert(a);
        history.insert(b);

        assert!(!history.remove(&user("alice"), &b_id));
        assert_eq!(history.wipe(&user("alice")), 1);
        assert_eq!(history.len(), 1);
        assert!(history.remove(&user("bob"), &b_id));
        assert!(history.is_empty());
    }
}
