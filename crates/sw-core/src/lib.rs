pub mod analyze;
pub mod apply;
pub mod archive;
pub mod commit;
pub mod config;
pub mod coordinator;
pub mod diff;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod state;

pub mod types;

pub use crate::apply::ApplyResult;
pub use crate::archive::Archive;
pub use crate::error::StewardError;
pub use crate::orchestrator::{
    DecisionInput, RequestContext, ReviewDecider, ReviewOutcome, Steward,
};
