//! Korean prompt templates, one per benchmark task shape

use super::{value_text, Benchmark, Record};

/// Error type for prompt rendering
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PromptError {
    #[error("{benchmark}/{task}: missing field '{field}'")]
    MissingField {
        benchmark: Benchmark,
        task: String,
        field: String,
    },

    #[error("{benchmark}: no template for task '{task}'")]
    UnknownTask { benchmark: Benchmark, task: String },
}

struct Fields<'a> {
    record: &'a Record,
    benchmark: Benchmark,
    task: &'a str,
}

impl Fields<'_> {
    fn required(&self, name: &str) -> Result<String, PromptError> {
        match self.record.get(name) {
            Some(value) if !value.is_null() => Ok(value_text(value)),
            _ => Err(PromptError::MissingField {
                benchmark: self.benchmark,
                task: self.task.to_string(),
                field: name.to_string(),
            }),
        }
    }

    fn optional(&self, name: &str) -> String {
        self.record.get(name).map(value_text).unwrap_or_default()
    }
}

/// Render one record as the prompt sent to every model
pub fn format_prompt(benchmark: Benchmark, task: &str, record: &Record) -> Result<String, PromptError> {
    let f = Fields { record, benchmark, task };

    match benchmark {
        Benchmark::KoBest => format_kobest(&f),
        Benchmark::Kmmlu => Ok(format!(
            "주제: {}\n질문: {}\nA. {}\nB. {}\nC. {}\nD. {}\n정답(A-D):",
            f.required("Category")?,
            f.required("question")?,
            f.required("A")?,
            f.required("B")?,
            f.required("C")?,
            f.required("D")?,
        )),
        // HAE-RAE tasks vary in shape; query and options cover all of them
        Benchmark::Haerae => Ok(format!(
            "질문: {}\n{}\n정답:",
            f.optional("query"),
            f.optional("options"),
        )),
        Benchmark::LogicKor => format_logickor(&f),
    }
}

fn format_kobest(f: &Fields<'_>) -> Result<String, PromptError> {
    match f.task {
        "boolq" => Ok(format!(
            "지문: {}\n질문: {}\n위 질문에 대한 답이 참(True)이면 1, 거짓(False)이면 0을 선택하세요.\n정답:",
            f.required("paragraph")?,
            f.required("question")?,
        )),
        "copa" => Ok(format!(
            "전제: {}\n질문: {}\n선택지 1: {}\n선택지 2: {}\n정답(1 또는 2):",
            f.required("premise")?,
            f.required("question")?,
            f.required("alternative_1")?,
            f.required("alternative_2")?,
        )),
        "hellaswag" => Ok(format!(
            "문맥: {}\n이어질 문장으로 가장 적절한 것은?\n1: {}\n2: {}\n3: {}\n4: {}\n정답(1-4):",
            f.required("context")?,
            f.required("ending_1")?,
            f.required("ending_2")?,
            f.required("ending_3")?,
            f.required("ending_4")?,
        )),
        "sentineg" => Ok(format!(
            "문장: {}\n위 문장의 긍정/부정 여부를 판단하세요. (긍정: 1, 부정: 0)\n정답:",
            f.required("sentence")?,
        )),
        "wic" => Ok(format!(
            "단어: {}\n문장 1: {}\n문장 2: {}\n위 두 문장에서 해당 단어가 같은 의미로 쓰였으면 1, 다르면 0을 선택하세요.\n정답:",
            f.required("word")?,
            f.required("context_1")?,
            f.required("context_2")?,
        )),
        other => Err(PromptError::UnknownTask {
            benchmark: f.benchmark,
            task: other.to_string(),
        }),
    }
}

/// First turn of the multi-turn question list
fn format_logickor(f: &Fields<'_>) -> Result<String, PromptError> {
    let questions = f.record.get("questions").ok_or_else(|| PromptError::MissingField {
        benchmark: f.benchmark,
        task: f.task.to_string(),
        field: "questions".to_string(),
    })?;

    match questions.as_array() {
        Some(turns) if !turns.is_empty() => Ok(value_text(&turns[0])),
        _ => Ok(value_text(questions)),
    }
}
