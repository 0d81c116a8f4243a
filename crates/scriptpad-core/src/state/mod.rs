//! Session state carried between submissions.
//!
//! ```text
//! S0 (None) --submit ok--> S1 --submit ok--> S2
//!                           \--submit fails--> S1 (unchanged)
//! ```

mod session;

pub(crate) use session::StateBuilder;
pub use session::{Import, SessionState, Variable};
