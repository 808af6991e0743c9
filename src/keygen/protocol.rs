// SPDX-License-Identifier: Apache-2.0

//! Allocation protocol
//!
//! One allocation attempt as a state machine: the allocator runs the
//! [`Action`] it is given against the cache and reports back what it
//! observed, until the attempt yields a key or asks to be retried.
//!
//! ```text
//! add placeholder -> inc -> [refresh ttl] -> n >= MIN          => allocated
//!                                         -> n <  MIN          => cas(n, placeholder), retry
//!                                         -> not a number      => load max key
//! load max key -> cas(placeholder, max(max, MIN) + 1) -> ok    => allocated
//!                                                     -> lost  => inc again
//! inc again -> n >= MIN => allocated | n < MIN => reset, retry | not a number => clear stray, retry
//! ```

use std::time::Duration;

/// Non-numeric marker value; an increment on it fails instead of
/// silently starting the counter at 1.
pub const PLACEHOLDER: &str = "empty-placeholder";
/// Counter values below this are treated as a lost race with a reset.
pub const MIN_VALID_KEY: i64 = 1000;
pub const MAX_ATTEMPTS: u32 = 5;
pub const COUNTER_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Cache operation to run next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `add(key, PLACEHOLDER, ttl)`
    AddPlaceholder,
    /// `inc(key, 1)`
    Increment,
    /// `set_ttl(key, COUNTER_TTL)`
    RefreshTtl,
    /// `cas(key, value, PLACEHOLDER)`
    ResetToPlaceholder(i64),
    /// Scan every shard for the largest primary key
    LoadMaxKey,
    /// `cas(key, PLACEHOLDER, candidate)`
    Initialize(i64),
    /// `cad(key, PLACEHOLDER)`
    ClearStray,
}

/// Outcome of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Done,
    Counter(Option<i64>),
    Swapped(bool),
    MaxKey(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Run(Action),
    Allocated(i64),
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Incrementing { fallback: bool },
    RefreshingTtl { counter: Option<i64>, fallback: bool },
    Resetting,
    LoadingMax,
    Initializing(i64),
    ClearingStray,
    Finished,
}

/// State of a single allocation attempt.
#[derive(Debug, Clone)]
pub struct AllocationStep {
    phase: Phase,
    ttl_supported: bool,
    cold_start: bool,
}

impl AllocationStep {
    pub fn new(ttl_supported: bool) -> Self {
        Self {
            phase: Phase::Start,
            ttl_supported,
            cold_start: false,
        }
    }

    pub fn first_action(&self) -> Action {
        Action::AddPlaceholder
    }

    /// Whether this attempt had to recompute the counter from the shards.
    pub fn is_cold_start(&self) -> bool {
        self.cold_start
    }

    pub fn advance(&mut self, observation: Observation) -> Transition {
        use Observation::*;

        match (self.phase, observation) {
            (Phase::Start, _) => self.run(Phase::Incrementing { fallback: false }, Action::Increment),

            (Phase::Incrementing { fallback }, Counter(counter)) => {
                if self.ttl_supported {
                    self.run(Phase::RefreshingTtl { counter, fallback }, Action::RefreshTtl)
                } else {
                    self.evaluate(counter, fallback)
                }
            }
            (Phase::RefreshingTtl { counter, fallback }, _) => self.evaluate(counter, fallback),

            (Phase::Resetting, _) | (Phase::ClearingStray, _) => self.finish(Transition::Retry),

            (Phase::LoadingMax, MaxKey(max)) => {
                let candidate = max.max(MIN_VALID_KEY).saturating_add(1);
                self.run(Phase::Initializing(candidate), Action::Initialize(candidate))
            }

            (Phase::Initializing(candidate), Swapped(true)) => {
                self.finish(Transition::Allocated(candidate))
            }
            // someone else initialized the counter first
            (Phase::Initializing(_), Swapped(false)) => {
                self.run(Phase::Incrementing { fallback: true }, Action::Increment)
            }

            // unexpected observation for the current phase
            _ => self.finish(Transition::Retry),
        }
    }

    fn evaluate(&mut self, counter: Option<i64>, fallback: bool) -> Transition {
        match counter {
            Some(value) if value >= MIN_VALID_KEY => self.finish(Transition::Allocated(value)),
            Some(value) => self.run(Phase::Resetting, Action::ResetToPlaceholder(value)),
            None if fallback => self.run(Phase::ClearingStray, Action::ClearStray),
            None => {
                self.cold_start = true;
                self.run(Phase::LoadingMax, Action::LoadMaxKey)
            }
        }
    }

    fn run(&mut self, phase: Phase, action: Action) -> Transition {
        self.phase = phase;
        Transition::Run(action)
    }

    fn finish(&mut self, transition: Transition) -> Transition {
        self.phase = Phase::Finished;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds observations and collects every transition.
    fn drive(ttl: bool, observations: &[Observation]) -> Vec<Transition> {
        let mut step = AllocationStep::new(ttl);
        observations.iter().map(|o| step.advance(*o)).collect()
    }

    #[test]
    fn warm_counter_allocates_directly() {
        let transitions = drive(
            true,
            &[Observation::Done, Observation::Counter(Some(5000)), Observation::Done],
        );
        assert_eq!(
            transitions,
            vec![
                Transition::Run(Action::Increment),
                Transition::Run(Action::RefreshTtl),
                Transition::Allocated(5000),
            ]
        );
    }

    #[test]
    fn skips_ttl_refresh_without_ttl_support() {
        let transitions = drive(false, &[Observation::Done, Observation::Counter(Some(5000))]);
        assert_eq!(transitions.last(), Some(&Transition::Allocated(5000)));
    }

    #[test]
    fn small_counter_is_reset_and_retried() {
        let transitions = drive(
            false,
            &[Observation::Done, Observation::Counter(Some(1)), Observation::Swapped(true)],
        );
        assert_eq!(
            transitions[1..],
            [Transition::Run(Action::ResetToPlaceholder(1)), Transition::Retry]
        );
    }

    #[test]
    fn cold_start_initializes_from_max_key() {
        let mut step = AllocationStep::new(false);
        assert_eq!(step.advance(Observation::Done), Transition::Run(Action::Increment));
        assert_eq!(step.advance(Observation::Counter(None)), Transition::Run(Action::LoadMaxKey));
        assert!(step.is_cold_start());
        assert_eq!(
            step.advance(Observation::MaxKey(500_000)),
            Transition::Run(Action::Initialize(500_001))
        );
        assert_eq!(step.advance(Observation::Swapped(true)), Transition::Allocated(500_001));
    }

    #[test]
    fn cold_start_on_empty_tables_starts_above_threshold() {
        let transitions = drive(
            false,
            &[Observation::Done, Observation::Counter(None), Observation::MaxKey(0)],
        );
        assert_eq!(
            transitions.last(),
            Some(&Transition::Run(Action::Initialize(MIN_VALID_KEY + 1)))
        );
    }

    #[test]
    fn lost_initialization_falls_back_to_increment() {
        let lost = [
            Observation::Done,
            Observation::Counter(None),
            Observation::MaxKey(500_000),
            Observation::Swapped(false),
        ];

        let mut winner = lost.to_vec();
        winner.push(Observation::Counter(Some(500_002)));
        assert_eq!(drive(false, &winner).last(), Some(&Transition::Allocated(500_002)));

        let mut stray = lost.to_vec();
        stray.extend([Observation::Counter(None), Observation::Swapped(true)]);
        let transitions = drive(false, &stray);
        assert_eq!(
            transitions[4..],
            [Transition::Run(Action::ClearStray), Transition::Retry]
        );

        let mut small = lost.to_vec();
        small.push(Observation::Counter(Some(3)));
        assert_eq!(
            drive(false, &small).last(),
            Some(&Transition::Run(Action::ResetToPlaceholder(3)))
        );
    }
}
