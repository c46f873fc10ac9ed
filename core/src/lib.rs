//! Decompilation core: shared expression model, the instruction lifters,
//! the Java and dump writers, and the task/pool machinery that drives
//! archive-wide runs.

pub mod apk;
pub mod dump;
pub mod errors;
pub mod expr;
pub mod input;
pub mod jar;
pub mod java;
pub mod lift;
pub mod pool;
pub mod source;
pub mod task;

pub use errors::*;
pub use input::InputKind;
pub use task::TaskKind;
