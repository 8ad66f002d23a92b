//! Work-set entries: in-flight messages keyed by destination vertex.

use serde::{Deserialize, Serialize};

/// A single in-log work-set record. The log key is the *destination* vertex
/// (`dstKey`), which is supplied separately at publish/consume time — the
/// partitioner routes on that key, not on `src_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSetEntry<K, Msg> {
    pub superstep: i32,
    pub src_key: K,
    /// Absent for the optional seed message emitted during initial seeding (§4.7).
    pub message: Option<Msg>,
}

impl<K, Msg> WorkSetEntry<K, Msg> {
    pub fn new(superstep: i32, src_key: K, message: Option<Msg>) -> Self {
        WorkSetEntry { superstep, src_key, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_absent_message_for_seed_entries() {
        let e: WorkSetEntry<&str, i32> = WorkSetEntry::new(0, "a", None);
        assert_eq!(e.superstep, 0);
        assert!(e.message.is_none());
    }
}
