//! The external compute executor client contract (§4.2, C2).
//!
//! The core never executes jobs in-process; it only talks to an
//! executor through this trait. [`ScriptedExecutorClient`] is a scripted
//! test double that lets manager-level tests drive the §8 scenarios
//! without a real batch backend.

mod error;
mod scripted;
mod traits;

pub use error::ExecutorError;
pub use scripted::ScriptedExecutorClient;
pub use traits::{ExecutorClient, ExecutorJobInfo, RuntimeJobResult};
