// Core engine exports
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod scoring;
pub mod selection;

pub use error::{AllocationError, RegistryError};
pub use events::AllocationEvent;
pub use lifecycle::{LifecycleConfig, MatchLifecycle};
pub use orchestrator::{AllocationOrchestrator, MatchHandle, OrchestratorConfig};
pub use registry::CandidateRegistry;
pub use scoring::{score_candidate, composite_score, AVAILABILITY_WEIGHT, CATEGORY_FIT_WEIGHT, RATING_TIER_WEIGHT};
pub use selection::{RankedCandidate, Selection, SelectionPolicy};
