//! Audit orchestration: evaluator panel, drift tracking, bounded dispatch.

pub mod context;
pub mod evaluator;
pub mod model;
pub mod orchestrator;
pub mod verdict;

pub use context::EvaluationContext;
pub use evaluator::{Evaluator, EvaluatorRegistry, PromptEvaluator};
pub use model::{ChatModelCaller, ModelCaller};
pub use orchestrator::{AuditReport, AuditSink, FlushOutcome, Orchestrator};
pub use verdict::{is_drift, parse_verdict, stance, Stance, Verdict};
