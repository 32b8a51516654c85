//! Evaluation execution engine

pub mod executor;
pub mod progress;
pub mod rate_limiter;

pub use executor::{
    Evaluator, NoOpProgress, PreparedSample, ProgressCallback, RunPlan, RunReport, Stage, Triple,
    TripleOutcome, TripleReport,
};
pub use progress::BarProgress;
pub use rate_limiter::RateLimiter;
