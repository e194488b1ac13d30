use crate::entities::ExtractedEntity;
use crate::intent::QueryIntent;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    pub max_queries: usize,
    pub max_intents: usize,
    pub max_entities: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_queries: 10,
            max_intents: 10,
            max_entities: 20,
        }
    }
}

impl SessionLimits {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_queries == 0 || self.max_intents == 0 || self.max_entities == 0 {
            return Err("session limits must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Bounded recent history of one session, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub previous_queries: VecDeque<String>,
    pub previous_intents: VecDeque<QueryIntent>,
    pub previous_entities: VecDeque<ExtractedEntity>,
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, items: impl IntoIterator<Item = T>, cap: usize) {
    buffer.extend(items);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}

/// In-process session map. Sessions are created on first use and live
/// until cleared.
pub struct SessionStore {
    limits: SessionLimits,
    sessions: Mutex<HashMap<String, SessionContext>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionContext>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one turn and trim to the limits under a single lock.
    /// Returns the updated snapshot.
    pub fn record(
        &self,
        session_id: &str,
        query: &str,
        intent: QueryIntent,
        entities: &[ExtractedEntity],
    ) -> SessionContext {
        let mut sessions = self.lock();
        let context = sessions.entry(session_id.to_string()).or_default();
        push_bounded(&mut context.previous_queries, [query.to_string()], self.limits.max_queries);
        push_bounded(&mut context.previous_intents, [intent], self.limits.max_intents);
        push_bounded(
            &mut context.previous_entities,
            entities.iter().cloned(),
            self.limits.max_entities,
        );
        context.clone()
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<SessionContext> {
        self.lock().get(session_id).cloned()
    }

    /// Returns whether the session existed.
    pub fn clear(&self, session_id: &str) -> bool {
        let removed = self.lock().remove(session_id).is_some();
        if removed {
            log::info!("Cleared context for session {session_id}");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn total_queries(&self) -> usize {
        self.lock()
            .values()
            .map(|context| context.previous_queries.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityCategory;
    use pretty_assertions::assert_eq;

    fn entity(n: usize) -> ExtractedEntity {
        ExtractedEntity {
            text: format!("e{n}"),
            category: EntityCategory::Skill,
            confidence: 0.9,
            start: 0,
            end: 2,
            normalized: format!("e{n}"),
        }
    }

    #[test]
    fn keeps_most_recent_turns_only() {
        let store = SessionStore::new(SessionLimits::default());
        for i in 0..15 {
            store.record("s1", &format!("q{i}"), QueryIntent::Search, &[entity(2 * i), entity(2 * i + 1)]);
        }
        let context = store.get("s1").unwrap();
        assert_eq!(context.previous_queries.len(), 10);
        assert_eq!(context.previous_queries.front().unwrap(), "q5");
        assert_eq!(context.previous_queries.back().unwrap(), "q14");
        assert_eq!(context.previous_intents.len(), 10);
        assert_eq!(context.previous_entities.len(), 20);
        assert_eq!(context.previous_entities.front().unwrap().text, "e10");
    }

    #[test]
    fn sessions_are_independent_and_clearable() {
        let store = SessionStore::new(SessionLimits::default());
        store.record("a", "one", QueryIntent::List, &[]);
        store.record("b", "two", QueryIntent::Compare, &[]);
        store.record("b", "three", QueryIntent::Compare, &[]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_queries(), 3);

        assert!(store.clear("a"));
        assert!(!store.clear("a"));
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b").unwrap().previous_queries.len(), 2);
    }
}
