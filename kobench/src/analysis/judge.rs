//! LLM-as-judge grading of open-ended responses on a 1-5 scale

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::config::{Config, JudgeConfig};
use crate::providers::{
    create_model, CompletionRequest, LLMProvider, ProviderError, ERROR_SENTINEL,
};
use crate::results::{read_records, RecordError, ResultRecord, COLUMNS};

/// Rubric sent to the judge; `{question}` and `{response}` are filled in
pub const JUDGE_PROMPT: &str = "당신은 한국어 AI 응답의 품질을 평가하는 전문가입니다.

## 평가 기준
다음 기준에 따라 응답을 1-5점으로 평가해주세요:

**5점 (탁월함)**: 질문의 모든 측면에 완벽하게 답변. 논리적이고 창의적이며 깊이 있는 분석 제공.
**4점 (우수함)**: 질문에 잘 답변했으나 약간의 개선 여지가 있음. 대체로 정확하고 유용함.
**3점 (보통)**: 기본적인 답변을 제공하나 깊이가 부족하거나 일부 누락이 있음.
**2점 (미흡함)**: 질문에 부분적으로만 답변하거나 상당한 오류가 있음.
**1점 (부적절함)**: 질문과 관련 없거나 완전히 잘못된 답변.

## 질문
{question}

## AI의 응답
{response}

## 평가 지시
위 응답을 평가하고, 반드시 다음 형식으로만 답변하세요:
점수: [1-5 중 숫자 하나]
이유: [한 문장으로 간단한 평가 이유]
";

/// Upper bound for one judge call
const JUDGE_TIMEOUT: Duration = Duration::from_secs(60);

static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"점수[:\s]*([1-5])", r"([1-5])\s*점", r"^([1-5])[.\s]"]
        .iter()
        .map(|p| Regex::new(p).expect("judge score pattern"))
        .collect()
});

/// Error type for judge runs
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Judge model unavailable: {0}")]
    Provider(#[from] ProviderError),

    #[error("CSV error writing {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Fill the rubric for one question/response pair
pub fn judge_prompt(question: &str, response: &str) -> String {
    JUDGE_PROMPT
        .replace("{question}", question)
        .replace("{response}", response)
}

/// Score in 1..=5 from the judge's reply, if any pattern matches
pub fn extract_judge_score(text: &str) -> Option<u8> {
    if text.is_empty() {
        return None;
    }
    SCORE_PATTERNS
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps[1].parse().ok())
}

/// Judge decision for one response
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub score: Option<u8>,
    /// Full judge reply, or the failure cause
    pub reason: String,
}

/// Per-file statistics of a judge pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeSummary {
    pub file: PathBuf,
    pub output: Option<PathBuf>,
    /// Model taken from the file's records
    pub model: Option<String>,
    pub total: usize,
    /// Non-empty, non-error predictions
    pub valid: usize,
    pub scored: usize,
    pub average: Option<f64>,
    /// Count of scores 1..=5
    pub distribution: [usize; 5],
}

/// Output path for a judged file: `<stem>_scored.csv` next to the input
pub fn scored_file_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_scored.csv", stem))
}

/// Any mention of the sentinel disqualifies a response from judging
fn is_valid_prediction(record: &ResultRecord) -> bool {
    !record.prediction.trim().is_empty() && !record.prediction.contains(ERROR_SENTINEL)
}

pub struct Judge {
    provider: Arc<dyn LLMProvider>,
    max_tokens: u32,
    temperature: f32,
    delay: Duration,
}

impl Judge {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &JudgeConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            delay: Duration::from_millis(config.delay_ms),
        }
    }

    /// Judge backed by the configured judge model
    pub fn from_config(config: &Config) -> Result<Self, JudgeError> {
        let provider = create_model(&config.judge.model, config)?;
        Ok(Self::new(provider, &config.judge))
    }

    pub fn model(&self) -> &str {
        self.provider.name()
    }

    /// Grade one response
    pub async fn judge(&self, question: &str, response: &str) -> Verdict {
        let request = CompletionRequest::new(judge_prompt(question, response), self.max_tokens)
            .with_temperature(self.temperature);

        let result = match tokio::time::timeout(JUDGE_TIMEOUT, self.provider.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: JUDGE_TIMEOUT.as_millis() as u64,
            }),
        };

        match result {
            Ok(reply) => Verdict {
                score: extract_judge_score(&reply.content),
                reason: reply.content,
            },
            Err(e) => {
                tracing::warn!("Judge call on {} failed: {}", self.model(), e);
                Verdict {
                    score: None,
                    reason: format!("Error: {}", e),
                }
            }
        }
    }

    /// Grade every valid response of a result file and write `<stem>_scored.csv`
    pub async fn score_file(&self, path: impl AsRef<Path>) -> Result<JudgeSummary, JudgeError> {
        let path = path.as_ref();
        let records = read_records(path)?;
        let valid: Vec<&ResultRecord> = records.iter().filter(|r| is_valid_prediction(r)).collect();

        tracing::info!(
            "Judging {}: {}/{} valid responses",
            path.display(),
            valid.len(),
            records.len()
        );

        let mut summary = JudgeSummary {
            file: path.to_path_buf(),
            output: None,
            model: records.first().map(|r| r.model.clone()),
            total: records.len(),
            valid: valid.len(),
            scored: 0,
            average: None,
            distribution: [0; 5],
        };
        if valid.is_empty() {
            return Ok(summary);
        }

        let mut verdicts = Vec::with_capacity(valid.len());
        for (idx, record) in valid.iter().enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let verdict = self.judge(&record.prompt, &record.prediction).await;
            tracing::debug!("{} #{}: score {:?}", path.display(), idx, verdict.score);
            verdicts.push(verdict);
        }

        let scores: Vec<u8> = verdicts.iter().filter_map(|v| v.score).collect();
        for &score in &scores {
            summary.distribution[(score - 1) as usize] += 1;
        }
        summary.scored = scores.len();
        if !scores.is_empty() {
            summary.average =
                Some(scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64);
        }

        let output = scored_file_path(path);
        write_scored(&output, &valid, &verdicts)?;
        tracing::info!("Saved judge scores to {}", output.display());
        summary.output = Some(output);

        Ok(summary)
    }
}

fn write_scored(path: &Path, records: &[&ResultRecord], verdicts: &[Verdict]) -> Result<(), JudgeError> {
    let csv_error = |source| JudgeError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    let mut header: Vec<&str> = COLUMNS.to_vec();
    header.extend(["judge_score", "judge_reason"]);
    writer.write_record(&header).map_err(csv_error)?;

    for (record, verdict) in records.iter().zip(verdicts) {
        let score = verdict.score.map(|s| s.to_string()).unwrap_or_default();
        writer
            .write_record([
                record.model.as_str(),
                record.benchmark.as_str(),
                record.task.as_str(),
                record.prompt.as_str(),
                record.prediction.as_str(),
                record.reference.as_str(),
                record.sample.as_str(),
                score.as_str(),
                verdict.reason.as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer.flush().map_err(|e| csv_error(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ProviderResult};
    use crate::results::ResultWriter;
    use crate::runner::RateLimiter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedJudge {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
        limiter: Arc<RateLimiter>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedJudge {
        fn name(&self) -> &str {
            "judge"
        }

        fn api_model(&self) -> &str {
            "judge-1"
        }

        async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
            assert!(request.prompt.contains("## AI의 응답"));
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(idx) {
                Some(reply) => Ok(CompletionResponse {
                    content: reply.to_string(),
                    model: "judge-1".to_string(),
                    finish_reason: "stop".to_string(),
                    latency_ms: 1,
                }),
                None => Err(ProviderError::Api {
                    status: 500,
                    message: "no more replies".to_string(),
                }),
            }
        }

        fn rate_limiter(&self) -> &Arc<RateLimiter> {
            &self.limiter
        }
    }

    #[test]
    fn test_extract_judge_score_patterns() {
        assert_eq!(extract_judge_score("점수: 4\n이유: 좋음"), Some(4));
        assert_eq!(extract_judge_score("이 응답은 3점입니다"), Some(3));
        assert_eq!(extract_judge_score("5. 훌륭함"), Some(5));
        assert_eq!(extract_judge_score("점수 없음"), None);
        assert_eq!(extract_judge_score(""), None);
        // first pattern wins over later ones
        assert_eq!(extract_judge_score("2점 같지만 점수: 5"), Some(5));
    }

    #[test]
    fn test_prompt_fills_placeholders() {
        let prompt = judge_prompt("질문 내용", "응답 내용");
        assert!(prompt.contains("## 질문\n질문 내용\n"));
        assert!(prompt.contains("## AI의 응답\n응답 내용\n"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_scored_file_path() {
        assert_eq!(
            scored_file_path(Path::new("results/20250101_000000_m_logickor.csv")),
            PathBuf::from("results/20250101_000000_m_logickor_scored.csv")
        );
    }

    #[tokio::test]
    async fn test_score_file_skips_errors_and_summarizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20250101_000000_m_logickor.csv");
        let mut writer = ResultWriter::create(&path).unwrap();
        for prediction in ["첫 응답", "Error: Timeout after 600000ms", "두번째 응답", "세번째 응답"] {
            writer
                .append(&ResultRecord {
                    model: "m".to_string(),
                    benchmark: "logickor".to_string(),
                    task: "logickor".to_string(),
                    prompt: "질문".to_string(),
                    prediction: prediction.to_string(),
                    reference: String::new(),
                    sample: "{}".to_string(),
                })
                .unwrap();
        }
        drop(writer);

        let provider = Arc::new(ScriptedJudge {
            replies: vec!["점수: 4\n이유: 좋음", "판단 불가"],
            calls: AtomicUsize::new(0),
            limiter: Arc::new(RateLimiter::new(0)),
        });
        let config = JudgeConfig {
            delay_ms: 0,
            ..JudgeConfig::default()
        };
        let judge = Judge::new(provider, &config);
        let summary = judge.score_file(&path).await.unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.scored, 1);
        assert_eq!(summary.average, Some(4.0));
        assert_eq!(summary.distribution, [0, 0, 0, 1, 0]);
        assert_eq!(summary.model.as_deref(), Some("m"));

        let output = summary.output.unwrap();
        let mut reader = csv::Reader::from_path(&output).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 9);
        assert_eq!(&headers[7], "judge_score");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][7], "4");
        assert_eq!(&rows[1][7], "");
        assert!(rows[2][8].starts_with("Error: API error: 500"));
    }
}
