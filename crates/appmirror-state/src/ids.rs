//! Identifier generation for stored records.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh record identifiers.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Predictable `{prefix}-{n}` identifiers.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_are_unique() {
        let ids: HashSet<String> = (0..100).map(|_| UuidGenerator.new_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new("rec");
        assert_eq!(ids.new_id(), "rec-1");
        assert_eq!(ids.new_id(), "rec-2");
    }
}
