//! Benchmark catalogue, dataset sources, sampling and prompt formatting
//!
//! The set of benchmarks is closed: each family carries its own dataset id,
//! split convention, task list and prompt templates.

pub mod prompts;
pub mod sample;
pub mod source;

pub use prompts::{format_prompt, PromptError};
pub use sample::sample;
pub use source::{DatasetSource, DatasetSplits, HubSource, LoadError, LocalSource};

use serde::{Deserialize, Serialize};

/// A single benchmark record, field order preserved from the source
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Benchmark families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Benchmark {
    KoBest,
    Kmmlu,
    Haerae,
    LogicKor,
}

/// How a benchmark's responses are scored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Extract an option token and compare it to the reference label
    Choice,
    /// Open-ended; graded by an LLM judge
    Judge,
}

pub const KOBEST_TASKS: &[&str] = &["boolq", "copa", "hellaswag", "sentineg", "wic"];

pub const KMMLU_CATEGORIES: &[&str] = &[
    "Accounting", "Agricultural-Sciences", "Aviation-Engineering-and-Maintenance",
    "Biology", "Chemical-Engineering", "Chemistry", "Civil-Engineering",
    "Computer-Science", "Construction", "Criminal-Law", "Ecology", "Economics",
    "Education", "Electrical-Engineering", "Electronics-Engineering",
    "Energy-Management", "Environmental-Science", "Fashion", "Food-Processing",
    "Gas-Technology", "Geomatics-and-Land-Surveying", "Health-Care-Management",
    "History", "Human-Resources-Management", "Industrial-Engineer",
    "Information-Technology", "Interior-Architecture-Design", "Korean-History",
    "Law", "Machine-Design", "Management", "Maritime-Engineering", "Marketing",
    "Materials-Engineering", "Math", "Mechanical-Engineering", "Nondestructive-Testing",
    "Patent", "Political-Science-and-Sociology", "Psychology", "Public-Safety",
    "Railway-and-Automotive-Engineering", "Real-Estate", "Refrigerating-Machinery",
    "Social-Welfare", "Taxation", "Telecommunications-and-Wireless-Technology",
    "TM-Chemical", "TM-Mechanical", "TM-Metallurgical",
];

pub const HAERAE_TASKS: &[&str] = &[
    "correct_definition_matching", "csat_geo", "csat_law", "csat_socio",
    "date_understanding", "general_knowledge", "history", "loan_words",
    "lyrics_denoising", "proverbs_denoising", "rare_words",
    "standard_nomenclature", "reading_comprehension",
];

pub const LOGICKOR_TASKS: &[&str] = &["default"];

impl Benchmark {
    pub fn all() -> Vec<Benchmark> {
        vec![Benchmark::KoBest, Benchmark::Kmmlu, Benchmark::Haerae, Benchmark::LogicKor]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Benchmark::KoBest => "kobest",
            Benchmark::Kmmlu => "kmmlu",
            Benchmark::Haerae => "haerae",
            Benchmark::LogicKor => "logickor",
        }
    }

    /// Fixed task list, in evaluation order
    pub fn tasks(&self) -> &'static [&'static str] {
        match self {
            Benchmark::KoBest => KOBEST_TASKS,
            Benchmark::Kmmlu => KMMLU_CATEGORIES,
            Benchmark::Haerae => HAERAE_TASKS,
            Benchmark::LogicKor => LOGICKOR_TASKS,
        }
    }

    /// Hugging Face dataset id
    pub fn dataset_id(&self) -> &'static str {
        match self {
            Benchmark::KoBest => "skt/kobest_v1",
            Benchmark::Kmmlu => "HAERAE-HUB/KMMLU",
            Benchmark::Haerae => "HAERAE-HUB/HAE_RAE_BENCH_1.1",
            Benchmark::LogicKor => "maywell/LogicKor",
        }
    }

    /// Dataset configuration (subset) holding `task`
    pub fn dataset_config<'a>(&self, task: &'a str) -> &'a str {
        match self {
            Benchmark::LogicKor => "default",
            _ => task,
        }
    }

    /// Splits to evaluate on, most preferred first
    pub fn preferred_splits(&self) -> &'static [&'static str] {
        match self {
            Benchmark::KoBest | Benchmark::Kmmlu => &["test"],
            Benchmark::Haerae => &["test", "train"],
            // small enough that the train split is the evaluation set
            Benchmark::LogicKor => &["train"],
        }
    }

    pub fn scoring(&self) -> ScoringMode {
        match self {
            Benchmark::LogicKor => ScoringMode::Judge,
            _ => ScoringMode::Choice,
        }
    }

    /// Task name as persisted in result files (`kobest_boolq`, `logickor`)
    pub fn qualified_task(&self, task: &str) -> String {
        match self {
            Benchmark::LogicKor => self.as_str().to_string(),
            _ => format!("{}_{}", self.as_str(), task),
        }
    }

    /// Split a persisted task name back into family and task
    pub fn from_qualified_task(qualified: &str) -> Option<(Benchmark, String)> {
        let (prefix, rest) = match qualified.split_once('_') {
            Some((prefix, rest)) => (prefix, rest),
            None => (qualified, ""),
        };
        let benchmark: Benchmark = prefix.parse().ok()?;
        if benchmark == Benchmark::LogicKor {
            return Some((benchmark, LOGICKOR_TASKS[0].to_string()));
        }
        if rest.is_empty() {
            return None;
        }
        Some((benchmark, rest.to_string()))
    }
}

impl std::str::FromStr for Benchmark {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kobest" => Ok(Benchmark::KoBest),
            "kmmlu" => Ok(Benchmark::Kmmlu),
            "haerae" | "hae-rae" => Ok(Benchmark::Haerae),
            "logickor" => Ok(Benchmark::LogicKor),
            _ => Err(format!("Unknown benchmark: {}", s)),
        }
    }
}

impl std::fmt::Display for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Render a field value the way it appears in prompts and reference labels
pub fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Ground-truth label of a record: `label`, else `answer`, else empty
pub fn reference_label(record: &Record) -> String {
    record
        .get("label")
        .or_else(|| record.get("answer"))
        .map(value_text)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_lists() {
        assert_eq!(Benchmark::KoBest.tasks().len(), 5);
        assert_eq!(Benchmark::Kmmlu.tasks().len(), 50);
        assert_eq!(Benchmark::Haerae.tasks().len(), 13);
        assert_eq!(Benchmark::LogicKor.tasks().len(), 1);
    }

    #[test]
    fn test_parse_benchmark() {
        assert_eq!("KoBEST".parse::<Benchmark>().unwrap(), Benchmark::KoBest);
        assert_eq!("hae-rae".parse::<Benchmark>().unwrap(), Benchmark::Haerae);
        assert!("mmlu".parse::<Benchmark>().is_err());
    }

    #[test]
    fn test_qualified_task_names() {
        assert_eq!(Benchmark::KoBest.qualified_task("copa"), "kobest_copa");
        assert_eq!(Benchmark::Kmmlu.qualified_task("Real-Estate"), "kmmlu_Real-Estate");
        assert_eq!(Benchmark::LogicKor.qualified_task("default"), "logickor");

        assert_eq!(
            Benchmark::from_qualified_task("haerae_csat_geo"),
            Some((Benchmark::Haerae, "csat_geo".to_string()))
        );
        assert_eq!(
            Benchmark::from_qualified_task("logickor"),
            Some((Benchmark::LogicKor, "default".to_string()))
        );
        assert_eq!(Benchmark::from_qualified_task("kobest"), None);
        assert_eq!(Benchmark::from_qualified_task("squad_v2"), None);
    }

    #[test]
    fn test_reference_label_prefers_label() {
        let record: Record = serde_json::from_value(json!({"label": 1, "answer": "C"})).unwrap();
        assert_eq!(reference_label(&record), "1");

        let record: Record = serde_json::from_value(json!({"answer": "C"})).unwrap();
        assert_eq!(reference_label(&record), "C");

        let record: Record = serde_json::from_value(json!({"question": "?"})).unwrap();
        assert_eq!(reference_label(&record), "");
    }
}
