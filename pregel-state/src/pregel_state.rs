//! The logical cursor of a Pregel computation: an immutable value describing
//! lifecycle, superstep, and phase, plus its stable binary wire encoding.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Coarse-grained stage of the computation as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Created,
    Running,
    Completed,
}

impl Lifecycle {
    fn to_byte(self) -> u8 {
        match self {
            Lifecycle::Created => 0,
            Lifecycle::Running => 1,
            Lifecycle::Completed => 2,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Lifecycle::Created),
            1 => Ok(Lifecycle::Running),
            2 => Ok(Lifecycle::Completed),
            other => Err(StateError::Invalid(format!("unknown lifecycle byte {other}"))),
        }
    }
}

/// Phase within a single superstep. RECEIVE precedes SEND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Receive,
    Send,
}

impl Phase {
    fn to_byte(self) -> u8 {
        match self {
            Phase::Receive => 0,
            Phase::Send => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Phase::Receive),
            1 => Ok(Phase::Send),
            other => Err(StateError::Invalid(format!("unknown phase byte {other}"))),
        }
    }
}

/// Immutable cursor of a Pregel computation.
///
/// Equality and ordering compare only `(lifecycle, superstep, phase)`;
/// `start_time`/`end_time` are advisory and excluded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PregelState {
    pub lifecycle: Lifecycle,
    pub superstep: i32,
    pub phase: Phase,
    pub start_time: i64,
    pub end_time: i64,
}

impl PartialEq for PregelState {
    fn eq(&self, other: &Self) -> bool {
        self.lifecycle == other.lifecycle
            && self.superstep == other.superstep
            && self.phase == other.phase
    }
}
impl Eq for PregelState {}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl PregelState {
    /// The state a driver publishes at the very start of a run.
    pub fn initial() -> Self {
        let t = now_millis();
        PregelState {
            lifecycle: Lifecycle::Running,
            superstep: 0,
            phase: Phase::Receive,
            start_time: t,
            end_time: 0,
        }
    }

    /// Advance `RECEIVE -> SEND` within the same step, or `SEND -> RECEIVE`
    /// while incrementing the step. Only valid while `RUNNING`.
    pub fn next(&self) -> Self {
        let (superstep, phase) = match self.phase {
            Phase::Receive => (self.superstep, Phase::Send),
            Phase::Send => (self.superstep + 1, Phase::Receive),
        };
        PregelState {
            lifecycle: self.lifecycle,
            superstep,
            phase,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    /// Transition to COMPLETED, stamping `end_time`.
    pub fn complete(&self) -> Self {
        PregelState {
            lifecycle: Lifecycle::Completed,
            superstep: self.superstep,
            phase: self.phase,
            start_time: self.start_time,
            end_time: now_millis(),
        }
    }

    /// Wall-clock duration the computation has been running, in milliseconds.
    /// Uses `end_time` if set, otherwise the current time.
    pub fn running_time_millis(&self) -> i64 {
        let end = if self.end_time > 0 { self.end_time } else { now_millis() };
        (end - self.start_time).max(0)
    }

    /// `true` once `lifecycle != CREATED`, i.e. `run()` has been called.
    pub fn is_started(&self) -> bool {
        !matches!(self.lifecycle, Lifecycle::Created)
    }

    /// Total order over `(superstep, phase)` with RECEIVE < SEND.
    pub fn order_key(&self) -> (i32, u8) {
        (self.superstep, self.phase.to_byte())
    }

    /// Encode as the stable binary wire format:
    /// `{byte lifecycle, int32 superstep, byte phase, int64 startTime, int64 endTime}`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(1 + 4 + 1 + 8 + 8);
        buf.push(self.lifecycle.to_byte());
        buf.extend_from_slice(&self.superstep.to_be_bytes());
        buf.push(self.phase.to_byte());
        buf.extend_from_slice(&self.start_time.to_be_bytes());
        buf.extend_from_slice(&self.end_time.to_be_bytes());
        Ok(buf)
    }

    /// Decode from the stable binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 22 {
            return Err(StateError::Invalid(format!(
                "expected 22-byte PregelState encoding, got {}",
                bytes.len()
            )));
        }
        let lifecycle = Lifecycle::from_byte(bytes[0])?;
        let superstep = i32::from_be_bytes(bytes[1..5].try_into().unwrap());
        let phase = Phase::from_byte(bytes[5])?;
        let start_time = i64::from_be_bytes(bytes[6..14].try_into().unwrap());
        let end_time = i64::from_be_bytes(bytes[14..22].try_into().unwrap());
        Ok(PregelState { lifecycle, superstep, phase, start_time, end_time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn next_advances_receive_to_send_same_step() {
        let s = PregelState::initial();
        let n = s.next();
        assert_eq!(n.superstep, 0);
        assert_eq!(n.phase, Phase::Send);
    }

    #[test]
    fn next_advances_send_to_receive_next_step() {
        let s = PregelState::initial().next();
        let n = s.next();
        assert_eq!(n.superstep, 1);
        assert_eq!(n.phase, Phase::Receive);
    }

    #[test]
    fn equality_ignores_timestamps() {
        let mut a = PregelState::initial();
        let mut b = a;
        a.start_time = 1;
        b.start_time = 999;
        assert_eq!(a, b);
    }

    #[test]
    fn order_key_orders_receive_before_send() {
        let s = PregelState::initial();
        let sent = s.next();
        assert!(s.order_key() < sent.order_key());
    }

    #[test]
    fn round_trips_through_binary_encoding() {
        let s = PregelState { end_time: 42, ..PregelState::initial() };
        let bytes = s.encode().unwrap();
        let decoded = PregelState::decode(&bytes).unwrap();
        assert_eq!(s, decoded);
        assert_eq!(decoded.end_time, 42);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = PregelState::decode(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, StateError::Invalid(_)));
    }

    #[test]
    fn completed_state_observed_past_max_iterations() {
        let mut s = PregelState::initial();
        for _ in 0..6 {
            s = s.next();
        }
        let completed = s.complete();
        assert_eq!(completed.lifecycle, Lifecycle::Completed);
        assert!(completed.running_time_millis() >= 0);
    }

    proptest! {
        /// §8 invariant 1: the shared PregelState transitions only via
        /// `next()`, which is monotone in `(superstep, phase)` no matter how
        /// many times it's applied.
        #[test]
        fn next_is_always_monotone_in_order_key(calls in 0usize..50) {
            let mut s = PregelState::initial();
            let mut prev_key = s.order_key();
            for _ in 0..calls {
                s = s.next();
                let key = s.order_key();
                prop_assert!(key > prev_key);
                prev_key = key;
            }
        }

        #[test]
        fn encode_decode_round_trips_for_any_reachable_state(calls in 0usize..50, end_time in 0i64..i64::MAX) {
            let mut s = PregelState::initial();
            for _ in 0..calls {
                s = s.next();
            }
            s.end_time = end_time;
            let bytes = s.encode().unwrap();
            let decoded = PregelState::decode(&bytes).unwrap();
            prop_assert_eq!(s, decoded);
            prop_assert_eq!(decoded.end_time, end_time);
        }
    }
}
