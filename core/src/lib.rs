//! # Gatepass Core
//!
//! Core traits and types for the Gatepass ticket lifecycle architecture.
//!
//! This crate provides the fundamental abstractions for building event-driven,
//! functional domain logic using the Reducer pattern.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer (commands and events)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_core::*;
//!
//! #[derive(Clone, Debug)]
//! struct TicketState {
//!     tickets: HashMap<TicketId, Ticket>,
//! }
//!
//! impl Reducer for TicketReducer {
//!     type State = TicketState;
//!     type Action = TicketAction;
//!     type Environment = TicketEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TicketState,
//!         action: TicketAction,
//!         env: &TicketEnvironment,
//!     ) -> SmallVec<[Effect<TicketAction>; 4]> {
//!         // Business logic goes here
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for TransferReducer {
    ///     type State = TransferState;
    ///     type Action = TransferAction;
    ///     type Environment = TransferEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut TransferState,
    ///         action: TransferAction,
    ///         env: &TransferEnvironment,
    ///     ) -> SmallVec<[Effect<TransferAction>; 4]> {
    ///         match action {
    ///             TransferAction::OpenTransfer { .. } => {
    ///                 // Business logic here
    ///                 SmallVec::new()
    ///             }
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the imperative shell. Most commands
        /// produce zero or one effect, so the inline capacity avoids heap
        /// allocation on the hot path.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the shell that
    /// drives them.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    #[allow(missing_docs)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts and expiries)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into
        /// the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter. Time is the canonical example: reducers
/// never call `Utc::now()` directly, which keeps expiry logic deterministic
/// under test.
pub mod environment {
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gatepass_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Deterministic clock for tests.
    ///
    /// Starts at a fixed instant and only moves when told to. Shared across
    /// threads via an internal mutex so a single `Arc<FixedClock>` can drive
    /// both the code under test and the test itself.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use gatepass_core::environment::{Clock, FixedClock};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let t0 = clock.now();
    /// clock.advance(Duration::days(8));
    /// assert_eq!(clock.now(), t0 + Duration::days(8));
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a clock frozen at the given instant.
        #[must_use]
        pub fn new(now: DateTime<Utc>) -> Self {
            Self { now: Mutex::new(now) }
        }

        /// Move the clock forward by `delta`.
        pub fn advance(&self, delta: Duration) {
            let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *now = *now + delta;
        }

        /// Set the clock to an absolute instant.
        pub fn set(&self, instant: DateTime<Utc>) {
            let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *now = instant;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, FixedClock, SystemClock};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn fixed_clock_advances_on_demand() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));

        clock.set(start + Duration::days(7));
        assert_eq!(clock.now(), start + Duration::days(7));
    }

    #[test]
    fn effect_debug_formats_without_executing() {
        let effect: Effect<u32> = Effect::Delay {
            duration: std::time::Duration::from_secs(5),
            action: Box::new(7),
        };
        let text = format!("{effect:?}");
        assert!(text.contains("Effect::Delay"));
    }
}
