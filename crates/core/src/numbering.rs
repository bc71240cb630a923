//! Report number sequence.
//!
//! The counter is persisted under its own key, independently of the draft, so clearing a draft
//! never rewinds it. The value only moves up: [`SequenceCounter::generate`] adds exactly one and
//! [`SequenceCounter::observe`] raises it to a number seen in a restored draft.

use crate::constants::COUNTER_KEY;
use crate::store::KeyValueStore;
use crate::{LaudoError, LaudoResult};
use laudo_types::ReportNumber;
use std::sync::Arc;

pub struct SequenceCounter {
    store: Arc<dyn KeyValueStore>,
    current: u64,
}

impl std::fmt::Debug for SequenceCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceCounter")
            .field("current", &self.current)
            .finish()
    }
}

impl SequenceCounter {
    /// Reads the persisted counter, or starts from `baseline` when nothing usable is stored.
    pub fn load(store: Arc<dyn KeyValueStore>, baseline: u64) -> Self {
        let current = match store.get(COUNTER_KEY) {
            Ok(Some(raw)) => match raw.trim().parse::<u64>() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!("ignoring unparseable counter {:?}, using {}", raw, baseline);
                    baseline
                }
            },
            Ok(None) => baseline,
            Err(e) => {
                tracing::warn!("failed to read counter, using {}: {}", baseline, e);
                baseline
            }
        };
        Self { store, current }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    /// Allocates the next report number.
    ///
    /// The new value is persisted before it is returned; if persisting fails the counter is not
    /// advanced.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Storage` if the counter cannot be written, or
    /// `LaudoError::InvalidInput` if the counter is exhausted.
    pub fn generate(&mut self) -> LaudoResult<ReportNumber> {
        let next = self
            .current
            .checked_add(1)
            .ok_or_else(|| LaudoError::InvalidInput("report counter exhausted".into()))?;
        self.persist(next)?;
        self.current = next;
        tracing::debug!(counter = next, "report number generated");
        Ok(ReportNumber::new(next))
    }

    /// Raises the counter to the number embedded in `text` when it is greater.
    ///
    /// Returns `true` when the counter moved.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Storage` if the raised counter cannot be written; the counter is then
    /// left unchanged.
    pub fn observe(&mut self, text: &str) -> LaudoResult<bool> {
        let Some(number) = ReportNumber::extract(text) else {
            return Ok(false);
        };
        if number.sequence() <= self.current {
            return Ok(false);
        }
        self.persist(number.sequence())?;
        tracing::info!(
            from = self.current,
            to = number.sequence(),
            "counter raised from restored report number"
        );
        self.current = number.sequence();
        Ok(true)
    }

    fn persist(&self, value: u64) -> LaudoResult<()> {
        self.store.set(COUNTER_KEY, &value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn counter_from(stored: Option<&str>) -> (SequenceCounter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        if let Some(value) = stored {
            store.set(COUNTER_KEY, value).unwrap();
        }
        (SequenceCounter::load(store.clone(), 1000), store)
    }

    #[test]
    fn test_fresh_counter_starts_at_baseline() {
        let (mut counter, store) = counter_from(None);
        assert_eq!(counter.current(), 1000);
        assert_eq!(counter.generate().unwrap().to_string(), "LAUDO-001001");
        assert_eq!(store.get(COUNTER_KEY).unwrap().as_deref(), Some("1001"));
    }

    #[test]
    fn test_stored_counter_is_used() {
        let (counter, _) = counter_from(Some("1234"));
        assert_eq!(counter.current(), 1234);

        let (garbage, _) = counter_from(Some("abc"));
        assert_eq!(garbage.current(), 1000);
    }

    #[test]
    fn test_observe_raises_only_when_greater() {
        let (mut counter, store) = counter_from(None);

        assert!(counter.observe("LAUDO-001050").unwrap());
        assert_eq!(counter.current(), 1050);
        assert_eq!(store.get(COUNTER_KEY).unwrap().as_deref(), Some("1050"));
        assert_eq!(counter.generate().unwrap().to_string(), "LAUDO-001051");

        assert!(!counter.observe("LAUDO-000900").unwrap());
        assert!(!counter.observe("LAUDO-001051").unwrap());
        assert!(!counter.observe("sem numero").unwrap());
        assert_eq!(counter.current(), 1051);
    }

    #[test]
    fn test_counter_never_decreases() {
        let (mut counter, _) = counter_from(None);
        let mut last = counter.current();
        for text in ["LAUDO-000010", "", "LAUDO-002000", "LAUDO-001999", "x"] {
            counter.observe(text).unwrap();
            assert!(counter.current() >= last);
            last = counter.current();
            counter.generate().unwrap();
            assert_eq!(counter.current(), last + 1);
            last = counter.current();
        }
        assert_eq!(counter.current(), 2003);
    }
}
