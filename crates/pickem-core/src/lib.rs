//! pickem-core: shared types and settlement rules
//!
//! Everything in this crate is pure: no database, no I/O. The server crate
//! persists these types and the rules here decide how a settled matchup moves
//! coins and streaks.

pub mod errors;
pub mod rules;
pub mod streak;
pub mod types;
pub mod validation;

pub use errors::*;
pub use rules::*;
pub use streak::*;
pub use types::*;
pub use validation::*;
