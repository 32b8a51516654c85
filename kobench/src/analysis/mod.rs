//! Post-hoc analysis of persisted results

pub mod aggregate;
pub mod extract;
pub mod judge;
pub mod scoring;

pub use aggregate::{Aggregator, Leaderboard, LeaderboardRow, TaskScore};
pub use extract::{extract, extract_answer, Extraction, ExtractionRule};
pub use judge::{extract_judge_score, Judge, JudgeError, JudgeSummary, Verdict, JUDGE_PROMPT};
pub use scoring::{
    is_correct, is_index_shift_task, normalize_token, score_record, score_records, ScoredRecord,
};
