//! Three-stage query pipeline: candidates, occurrence decision, aggregation.

pub mod aggregation;
pub mod candidates;
pub mod decision;
pub mod orchestrator;

pub use aggregation::{AggregationService, ItemsByDate};
pub use candidates::{CandidateQueryService, CandidateSet};
pub use decision::{DateDecision, DecisionReason, OccurrenceDecisionService, RangeDecision};
pub use orchestrator::{
    DateQueryOutput, PipelineStats, QueryOrchestrator, QueryReport, RangeQueryOutput, StageCounts,
    StageTimings,
};
