//! Testing utilities for Gatepass reducers.
//!
//! Provides the [`ReducerTest`] fluent harness for exercising reducers with
//! Given-When-Then syntax, plus assertion helpers for effects.


pub use reducer_test::{ReducerTest, assertions};
