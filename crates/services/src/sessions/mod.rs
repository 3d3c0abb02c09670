mod advancer;
mod context;
mod fallback;
mod grader;
mod loader;
mod orchestrator;
mod progress;

// Public API of the session subsystem.
pub use advancer::{AdvanceReport, DeclineReason, ProgressAdvancer};
pub use context::SessionContext;
pub use fallback::FallbackController;
pub use grader::{GradeOutcome, GradeTicket, GradedItem, ItemGrader, ItemState};
pub use loader::{PhaseContent, PhaseDataLoader, PhaseRequest};
pub use orchestrator::{LoadOutcome, SessionOrchestrator, Transition};
pub use progress::SessionProgress;
