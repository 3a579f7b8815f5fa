//! API services
//!
//! Transport-independent service layer wiring the core components behind
//! request/response models.

mod document;
mod interaction;
mod runs;
mod workspace;

pub use document::DocumentService;
pub use interaction::InteractionService;
pub use runs::RunService;
pub use workspace::WorkspaceService;
