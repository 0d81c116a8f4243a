//! Submission execution for script sessions.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │  execute(code, echo, cancel)
//!   ▼
//! ScriptEngine ── echo ──────────────────────────────▶ ScriptOutput
//!   │
//!   └── submission thread (large stack) ── oneshot ──▶ engine
//!         │
//!         └── run_submission(code, prior state)
//!               │  load + bind ─ errors ─▶ Failure::Compilation
//!               │  Machine::run ─ fault ─▶ Failure::Runtime / Canceled
//!               ▼
//!           new SessionState
//!   │
//!   ├── Ok  → state replaced; result or "OK" ───────▶ ScriptOutput
//!   └── Err → state kept; causes joined by "\n" ────▶ ScriptOutput
//! ```
//!
//! # Module Structure
//!
//! - `context` - Cooperative cancellation (`AbortHandle`)
//! - `engine` - `ScriptEngine`, the session owner
//! - `bootstrap` - Default import submission
//! - `failure` - Failure kinds and cause joining
//! - `submission` - Compile and run one submission

mod bootstrap;
mod context;
mod engine;
mod failure;
mod submission;

pub use bootstrap::{INITIALIZING_MESSAGE, add_default_imports};
pub use context::AbortHandle;
pub use engine::{OK_MESSAGE, ScriptEngine};
pub use failure::{Failure, FailureKind};
