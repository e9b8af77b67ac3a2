//! Cascading classifier — a fixed, ordered sequence of stages that either
//! conclude with a verdict or refine a running score for later stages.

pub mod cascade;
pub mod context;
pub mod deep;
pub mod hard_block;
pub mod heuristic;
pub mod neural;
pub mod priority;
pub mod statistical;
pub mod verdict;

pub use cascade::CascadeClassifier;
pub use context::{ContextOutcome, ContextStage, RelevanceTier, TrustTier};
pub use deep::{DeepVerdict, Role};
pub use hard_block::HardBlockStage;
pub use heuristic::{HeuristicOutcome, HeuristicStage};
pub use neural::EncoderClassifier;
pub use priority::PriorityBreakdown;
pub use statistical::TermModel;
pub use verdict::{ReasonCode, Stage, Tier, Verdict};
