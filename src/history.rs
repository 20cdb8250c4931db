use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{modes::Mode, store::KeyValueStore};

pub const HISTORY_LIMIT: usize = 10;
const SEARCH_HISTORY_KEY: &str = "search_history";
const RESUME_DRAFT_KEY: &str = "resume_draft";

// The most recent distinct queries per mode, newest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchHistory {
    entries: BTreeMap<String, Vec<String>>,
}
impl SearchHistory {
    // reads the history from the store; missing or malformed data yields an empty history
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(SEARCH_HISTORY_KEY) {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable search history: {err}");
                SearchHistory::default()
            }),
            None => SearchHistory::default(),
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;
        store.set(SEARCH_HISTORY_KEY, &json)
    }

    // puts the query at the front of the mode's list, dropping an earlier copy
    // and anything past the limit
    pub fn record(&mut self, mode: Mode, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        let list = self.entries.entry(mode.name().to_owned()).or_default();
        list.retain(|q| q != query);
        list.insert(0, query.to_owned());
        list.truncate(HISTORY_LIMIT);
    }

    pub fn entries_for(&self, mode: Mode) -> &[String] {
        self.entries
            .get(mode.name())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

pub fn load_resume_draft(store: &dyn KeyValueStore) -> Option<String> {
    store.get(RESUME_DRAFT_KEY)
}

pub fn save_resume_draft(store: &dyn KeyValueStore, draft: &str) -> anyhow::Result<()> {
    store.set(RESUME_DRAFT_KEY, draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn newest_first_without_duplicates() {
        let mut history = SearchHistory::default();
        history.record(Mode::Exam, "pharmacology");
        history.record(Mode::Exam, "sepsis");
        history.record(Mode::Exam, "pharmacology");

        assert_eq!(history.entries_for(Mode::Exam), ["pharmacology", "sepsis"]);
        assert!(history.entries_for(Mode::Tutor).is_empty());
    }

    #[test]
    fn never_exceeds_the_limit() {
        let mut history = SearchHistory::default();
        for i in 0..25 {
            history.record(Mode::Jobs, &format!("query {i}"));
        }
        let entries = history.entries_for(Mode::Jobs);
        assert_eq!(entries.len(), HISTORY_LIMIT);
        assert_eq!(entries[0], "query 24");
        assert_eq!(entries[HISTORY_LIMIT - 1], "query 15");
    }

    #[test]
    fn blank_queries_are_ignored() {
        let mut history = SearchHistory::default();
        history.record(Mode::Tutor, "   ");
        assert!(history.entries_for(Mode::Tutor).is_empty());
    }

    #[test]
    fn persists_as_a_mode_keyed_map() {
        let store = MemoryStore::new();
        let mut history = SearchHistory::default();
        history.record(Mode::NmcCbt, "safeguarding");
        history.save(&store).unwrap();

        let raw = store.get("search_history").unwrap();
        assert_eq!(raw, r#"{"NMC_CBT":["safeguarding"]}"#);
        assert_eq!(SearchHistory::load(&store), history);
    }

    #[test]
    fn malformed_history_loads_empty() {
        let store = MemoryStore::new();
        store.set("search_history", "[1,2,3]").unwrap();
        assert_eq!(SearchHistory::load(&store), SearchHistory::default());
    }

    #[test]
    fn resume_draft_round_trips_through_the_store() {
        let store = MemoryStore::new();
        assert_eq!(load_resume_draft(&store), None);
        save_resume_draft(&store, "# Jane Doe").unwrap();
        assert_eq!(load_resume_draft(&store).as_deref(), Some("# Jane Doe"));
    }
}
