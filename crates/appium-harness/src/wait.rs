//! Poll and wait utilities
//!
//! Two shapes of retry loop:
//!
//! - **Bounded attempts** ([`Poller`], [`poll`], [`poll_until`]): try up to N
//!   times with a fixed interval; faults raised by an attempt are swallowed and
//!   counted as a failed attempt.
//! - **Deadline** ([`wait_until_deadline`], [`wait_for_service_ready`]): loop
//!   while the clock is before the deadline, then sleep one settle period on
//!   success so a dependent subsystem can catch up.
//!
//! All loops take their time from a [`Clock`] so tests can observe every sleep.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{Clock, SYSTEM_CLOCK};
use crate::locator::{find_element_safe, Locator};
use crate::result::{HarnessError, HarnessResult};
use crate::session::{ElementHandle, Session};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default interval between deadline polls (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default settle grace after a deadline wait succeeds (1s)
pub const DEFAULT_SETTLE_MS: u64 = 1_000;

/// Default service readiness timeout (60s)
pub const DEFAULT_READINESS_TIMEOUT_MS: u64 = 60_000;

/// Default element presence timeout (5s)
pub const DEFAULT_PRESENCE_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// POLL STATE
// =============================================================================

/// What the most recent attempt produced
#[derive(Debug)]
pub enum Observed<T> {
    /// No attempt was made
    Nothing,
    /// The attempt returned a value that did not satisfy the predicate
    Value(T),
    /// The attempt raised a fault
    Fault(HarnessError),
}

impl<T: fmt::Debug> fmt::Display for Observed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("nothing"),
            Self::Value(value) => write!(f, "{value:?}"),
            Self::Fault(err) => write!(f, "fault: {err}"),
        }
    }
}

/// Terminal state of an exhausted poll
#[derive(Debug)]
pub struct PollState<T> {
    /// Attempts made
    pub attempts: usize,
    /// Last observed result
    pub last: Observed<T>,
}

impl<T: fmt::Debug> PollState<T> {
    /// Convert into [`HarnessError::TimeoutExhausted`]
    #[must_use]
    pub fn into_error(self) -> HarnessError {
        HarnessError::TimeoutExhausted {
            attempts: self.attempts,
            last: self.last.to_string(),
        }
    }
}

// =============================================================================
// BOUNDED POLL
// =============================================================================

/// Bounded-attempt poll loop
#[derive(Debug, Clone, Copy)]
pub struct Poller<'a> {
    clock: &'a dyn Clock,
    max_tries: usize,
    interval: Duration,
}

impl Poller<'static> {
    /// Poll on the system clock
    #[must_use]
    pub fn new(max_tries: usize, interval: Duration) -> Self {
        Self {
            clock: &SYSTEM_CLOCK,
            max_tries,
            interval,
        }
    }
}

impl<'a> Poller<'a> {
    /// Poll on a different clock
    #[must_use]
    pub fn with_clock<'b>(self, clock: &'b dyn Clock) -> Poller<'b> {
        Poller {
            clock,
            max_tries: self.max_tries,
            interval: self.interval,
        }
    }

    /// Maximum attempts
    #[must_use]
    pub const fn max_tries(&self) -> usize {
        self.max_tries
    }

    /// Run `attempt` until `is_ok` accepts its result.
    ///
    /// Sleeps `interval` between attempts but not after the last one. When every
    /// attempt fails, `on_failure` is called exactly once with the final state.
    pub fn run<T, E, A, P, F>(&self, mut attempt: A, mut is_ok: P, on_failure: F) -> Result<T, E>
    where
        A: FnMut() -> HarnessResult<T>,
        P: FnMut(&T) -> bool,
        F: FnOnce(PollState<T>) -> E,
    {
        let mut last = Observed::Nothing;
        for n in 1..=self.max_tries {
            match attempt() {
                Ok(value) if is_ok(&value) => {
                    debug!(attempt = n, "poll succeeded");
                    return Ok(value);
                }
                Ok(value) => last = Observed::Value(value),
                Err(err) => {
                    warn!(attempt = n, error = %err, "poll attempt raised, retrying");
                    last = Observed::Fault(err);
                }
            }
            if n < self.max_tries {
                self.clock.sleep(self.interval);
            }
        }
        Err(on_failure(PollState {
            attempts: self.max_tries,
            last,
        }))
    }
}

/// Poll on the system clock, mapping exhaustion through `on_failure`
pub fn poll<T, E, A, P, F>(
    attempt: A,
    is_ok: P,
    on_failure: F,
    max_tries: usize,
    interval: Duration,
) -> Result<T, E>
where
    A: FnMut() -> HarnessResult<T>,
    P: FnMut(&T) -> bool,
    F: FnOnce(PollState<T>) -> E,
{
    Poller::new(max_tries, interval).run(attempt, is_ok, on_failure)
}

/// Poll, failing with [`HarnessError::TimeoutExhausted`]
pub fn poll_until<T, A, P>(
    clock: &dyn Clock,
    attempt: A,
    is_ok: P,
    max_tries: usize,
    interval: Duration,
) -> HarnessResult<T>
where
    T: fmt::Debug,
    A: FnMut() -> HarnessResult<T>,
    P: FnMut(&T) -> bool,
{
    Poller::new(max_tries, interval)
        .with_clock(clock)
        .run(attempt, is_ok, PollState::into_error)
}

// =============================================================================
// DEADLINE WAIT
// =============================================================================

/// Options for deadline waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlineOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Grace sleep after success in milliseconds
    pub settle_ms: u64,
}

impl Default for DeadlineOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_READINESS_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

impl DeadlineOptions {
    /// Create new options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set settle grace in milliseconds
    #[must_use]
    pub const fn with_settle(mut self, settle_ms: u64) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get settle grace as Duration
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Time spent waiting, settle grace included
    pub elapsed: Duration,
    /// Predicate checks made
    pub attempts: usize,
    /// Description of what was waited for
    pub waited_for: String,
}

/// Loop while the clock is before the deadline, re-checking `predicate`.
///
/// On success sleeps one settle grace before returning.
///
/// # Errors
///
/// [`HarnessError::DeadlineExceeded`] when the deadline passes first.
pub fn wait_until_deadline<P>(
    clock: &dyn Clock,
    mut predicate: P,
    options: &DeadlineOptions,
    waited_for: &str,
) -> HarnessResult<WaitResult>
where
    P: FnMut() -> bool,
{
    let start = clock.now();
    let deadline = start + options.timeout();
    let mut attempts = 0;

    while clock.now() < deadline {
        attempts += 1;
        if predicate() {
            clock.sleep(options.settle());
            debug!(attempts, waited_for, "wait condition met");
            return Ok(WaitResult {
                elapsed: clock.now() - start,
                attempts,
                waited_for: waited_for.to_string(),
            });
        }
        clock.sleep(options.poll_interval());
    }

    Err(HarnessError::DeadlineExceeded {
        ms: options.timeout_ms,
        waited_for: waited_for.to_string(),
    })
}

/// Gate on a readiness probe, treating probe faults as "not ready yet"
pub fn wait_for_service_ready<P>(probe: P, options: &DeadlineOptions) -> HarnessResult<WaitResult>
where
    P: FnMut() -> HarnessResult<bool>,
{
    wait_for_service_ready_with_clock(&SYSTEM_CLOCK, probe, options)
}

/// [`wait_for_service_ready`] on an explicit clock
pub fn wait_for_service_ready_with_clock<P>(
    clock: &dyn Clock,
    mut probe: P,
    options: &DeadlineOptions,
) -> HarnessResult<WaitResult>
where
    P: FnMut() -> HarnessResult<bool>,
{
    wait_until_deadline(
        clock,
        || match probe() {
            Ok(ready) => ready,
            Err(err) => {
                warn!(error = %err, "readiness probe raised, retrying");
                false
            }
        },
        options,
        "service ready",
    )
}

// =============================================================================
// ELEMENT PRESENCE
// =============================================================================

/// Wait for an element to be present.
///
/// Checks at least once. Absence at the deadline is `Ok(None)`; transport
/// faults propagate immediately.
pub fn wait_for_presence(
    session: &dyn Session,
    locator: &Locator,
    timeout: Duration,
    interval: Duration,
) -> HarnessResult<Option<ElementHandle>> {
    wait_for_presence_with_clock(&SYSTEM_CLOCK, session, locator, timeout, interval)
}

/// [`wait_for_presence`] on an explicit clock
pub fn wait_for_presence_with_clock(
    clock: &dyn Clock,
    session: &dyn Session,
    locator: &Locator,
    timeout: Duration,
    interval: Duration,
) -> HarnessResult<Option<ElementHandle>> {
    let start = clock.now();
    loop {
        if let Some(element) = find_element_safe(session, locator)? {
            return Ok(Some(element));
        }
        if clock.now() - start >= timeout {
            debug!(%locator, timeout_ms = timeout.as_millis() as u64, "element never appeared");
            return Ok(None);
        }
        clock.sleep(interval);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::geometry::BoundingBox;
    use crate::session::ScriptedSession;
    use std::cell::Cell;

    // =========================================================================
    // Bounded poll
    // =========================================================================

    mod poll_tests {
        use super::*;

        #[test]
        fn test_fails_twice_then_succeeds() {
            let clock = ManualClock::new();
            let calls = Cell::new(0);
            let result = Poller::new(5, Duration::from_millis(100))
                .with_clock(&clock)
                .run(
                    || {
                        calls.set(calls.get() + 1);
                        if calls.get() < 3 {
                            Err(HarnessError::transport("not yet"))
                        } else {
                            Ok(true)
                        }
                    },
                    |ok| *ok,
                    PollState::into_error,
                );

            assert!(result.unwrap());
            assert_eq!(calls.get(), 3);
            assert_eq!(clock.sleep_count(), 2);
        }

        #[test]
        fn test_always_fails_calls_on_failure_once() {
            let clock = ManualClock::new();
            let calls = Cell::new(0);
            let failures = Cell::new(0);
            let result: Result<bool, String> = Poller::new(3, Duration::from_millis(100))
                .with_clock(&clock)
                .run(
                    || {
                        calls.set(calls.get() + 1);
                        Ok(false)
                    },
                    |ok| *ok,
                    |state| {
                        failures.set(failures.get() + 1);
                        format!("gave up after {}", state.attempts)
                    },
                );

            assert_eq!(result.unwrap_err(), "gave up after 3");
            assert_eq!(calls.get(), 3);
            assert_eq!(failures.get(), 1);
            assert_eq!(clock.sleeps(), vec![Duration::from_millis(100); 2]);
        }

        #[test]
        fn test_last_fault_is_reported() {
            let clock = ManualClock::new();
            let err = poll_until(
                &clock,
                || Err::<bool, _>(HarnessError::transport("socket closed")),
                |ok| *ok,
                2,
                Duration::from_millis(10),
            )
            .unwrap_err();

            match err {
                HarnessError::TimeoutExhausted { attempts, last } => {
                    assert_eq!(attempts, 2);
                    assert!(last.contains("socket closed"));
                }
                other => panic!("unexpected error {other:?}"),
            }
        }

        #[test]
        fn test_last_value_is_reported() {
            let clock = ManualClock::new();
            let err = poll_until(
                &clock,
                || Ok(vec!["NATIVE_APP".to_string()]),
                |contexts| contexts.len() > 1,
                1,
                Duration::from_millis(10),
            )
            .unwrap_err();
            assert!(err.to_string().contains("NATIVE_APP"));
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_immediate_success_never_sleeps() {
            let result: Result<u32, HarnessError> = poll(
                || Ok(7),
                |v| *v == 7,
                PollState::into_error,
                3,
                Duration::from_secs(60),
            );
            assert_eq!(result.unwrap(), 7);
        }
    }

    // =========================================================================
    // Deadline wait
    // =========================================================================

    mod deadline_tests {
        use super::*;

        #[test]
        fn test_success_sleeps_settle_grace() {
            let clock = ManualClock::new();
            let checks = Cell::new(0);
            let options = DeadlineOptions::new()
                .with_timeout(5_000)
                .with_poll_interval(500)
                .with_settle(1_000);

            let result = wait_until_deadline(
                &clock,
                || {
                    checks.set(checks.get() + 1);
                    checks.get() == 3
                },
                &options,
                "ready",
            )
            .unwrap();

            assert_eq!(result.attempts, 3);
            assert_eq!(result.elapsed, Duration::from_millis(2_000));
            assert_eq!(
                clock.sleeps(),
                vec![
                    Duration::from_millis(500),
                    Duration::from_millis(500),
                    Duration::from_millis(1_000)
                ]
            );
        }

        #[test]
        fn test_deadline_exceeded() {
            let clock = ManualClock::new();
            let options = DeadlineOptions::new().with_timeout(2_000).with_poll_interval(500);
            let err = wait_until_deadline(&clock, || false, &options, "never").unwrap_err();

            assert!(matches!(err, HarnessError::DeadlineExceeded { ms: 2_000, .. }));
            assert_eq!(clock.sleep_count(), 4);
        }

        #[test]
        fn test_service_probe_faults_are_not_ready() {
            let clock = ManualClock::new();
            let probes = Cell::new(0);
            let options = DeadlineOptions::new().with_settle(0);
            let result = wait_for_service_ready_with_clock(
                &clock,
                || {
                    probes.set(probes.get() + 1);
                    match probes.get() {
                        1 => Err(HarnessError::transport("connection refused")),
                        2 => Ok(false),
                        _ => Ok(true),
                    }
                },
                &options,
            )
            .unwrap();

            assert_eq!(result.attempts, 3);
            assert_eq!(result.waited_for, "service ready");
        }

        #[test]
        fn test_options_deserialize_partial() {
            let options: DeadlineOptions =
                serde_json::from_value(serde_json::json!({"timeout_ms": 10})).unwrap();
            assert_eq!(options.timeout_ms, 10);
            assert_eq!(options.settle_ms, DEFAULT_SETTLE_MS);
        }
    }

    // =========================================================================
    // Presence wait
    // =========================================================================

    mod presence_tests {
        use super::*;

        #[test]
        fn test_present_immediately() {
            let clock = ManualClock::new();
            let session =
                ScriptedSession::new().with_element(Locator::id("ok"), BoundingBox::default());
            let found = wait_for_presence_with_clock(
                &clock,
                &session,
                &Locator::id("ok"),
                Duration::from_secs(5),
                Duration::from_millis(500),
            )
            .unwrap();
            assert!(found.is_some());
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_absent_returns_none_at_timeout() {
            let clock = ManualClock::new();
            let session = ScriptedSession::new();
            let found = wait_for_presence_with_clock(
                &clock,
                &session,
                &Locator::id("missing"),
                Duration::from_secs(2),
                Duration::from_millis(500),
            )
            .unwrap();
            assert!(found.is_none());
            assert_eq!(session.call_count("find_element"), 5);
        }

        #[test]
        fn test_zero_timeout_checks_once() {
            let clock = ManualClock::new();
            let session = ScriptedSession::new();
            let found = wait_for_presence_with_clock(
                &clock,
                &session,
                &Locator::id("missing"),
                Duration::ZERO,
                Duration::from_millis(500),
            )
            .unwrap();
            assert!(found.is_none());
            assert_eq!(session.call_count("find_element"), 1);
        }

        #[test]
        fn test_transport_fault_propagates() {
            let clock = ManualClock::new();
            let session = ScriptedSession::new().with_transport_faults(1);
            let err = wait_for_presence_with_clock(
                &clock,
                &session,
                &Locator::id("x"),
                Duration::from_secs(5),
                Duration::from_millis(500),
            )
            .unwrap_err();
            assert!(err.is_transport());
        }
    }
}
