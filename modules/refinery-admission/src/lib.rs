//! Admission and ranking: which signals get evaluated this cycle.

pub mod dedup;
pub mod engine;
pub mod quota;
pub mod scoring;

pub use dedup::{dedup, diversity_cap, rank_order, ScoredSignal};
pub use engine::{AdmissionEngine, AdmissionParams, AdmissionStats, AdmittedBatch};
pub use quota::allocate;
pub use scoring::{
    recency_decay, BoostLimits, Boosts, MarketPolicy, PaperPolicy, PolicySet, PostPolicy,
    RepositoryPolicy, ScoringPolicy,
};
