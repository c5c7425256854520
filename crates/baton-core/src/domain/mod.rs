//! Domain model (IDs, outcomes, states, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod state;

pub use self::errors::{BuildError, ChainError, ConfigError, ItemError, PoolError};
pub use self::ids::{ChainId, WorkItemId};
pub use self::outcome::{ChainOutcome, StepResult};
pub use self::state::{Affinity, ChainState, WorkItemStatus};
