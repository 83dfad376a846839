//! Domain model (job handle, naming convention, states, events, errors).

pub mod ids;
pub mod naming;
pub mod job;
pub mod state;
pub mod events;
pub mod errors;
pub mod mime;
pub mod outcome;

pub use self::ids::JobId;
pub use self::naming::{INPUT_PREFIX, NamingConvention};
pub use self::job::Job;
pub use self::state::WaitState;
pub use self::events::WaitEvent;
pub use self::errors::{ErrorKind, JobError};
pub use self::mime::mime_for_key;
pub use self::outcome::{Completion, CompletionSummary};
