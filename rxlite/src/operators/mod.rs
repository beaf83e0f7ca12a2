//! Operator catalogue, split by concern:
//!
//! - `create`: sources (`create`, `just`, `from_iter`, `range`, `interval`, ...)
//! - `transform`: per-value stages (`filter`, `take_while`, `repeat`, ...)
//! - `schedule`: context binding (`subscribe_on`, `observe_on`)

mod create;
mod schedule;
mod transform;

pub use create::Emitter;
