//! Leaderboard table output

use std::path::Path;

use crate::analysis::Leaderboard;

/// `leaderboard_<timestamp>.csv`
pub fn leaderboard_file_name(timestamp: &str) -> String {
    format!("leaderboard_{}.csv", timestamp)
}

impl Leaderboard {
    fn header(&self) -> Vec<String> {
        let mut header = vec!["Model".to_string()];
        header.extend(self.benchmarks.iter().cloned());
        header.push("Average".to_string());
        header
    }

    fn row_cells(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.model.clone()];
                cells.extend(
                    self.benchmarks
                        .iter()
                        .map(|b| row.score(b).map(|s| format!("{:.4}", s)).unwrap_or_default()),
                );
                cells.push(format!("{:.4}", row.average));
                cells
            })
            .collect()
    }

    /// Write as CSV: `Model,<benchmark…>,Average`, rank order, empty cell for no data
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.header())?;
        for cells in self.row_cells() {
            writer.write_record(cells)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Print the leaderboard as a console table
pub fn print_leaderboard(leaderboard: &Leaderboard) {
    println!("\n=== Korean Benchmark Leaderboard ===\n");

    if leaderboard.rows.is_empty() {
        println!("No results to generate leaderboard.");
        return;
    }

    let name_width = leaderboard
        .rows
        .iter()
        .map(|r| r.model.len())
        .max()
        .unwrap_or(5)
        .max(5);

    print!("  {:<width$}", "Model", width = name_width);
    for benchmark in &leaderboard.benchmarks {
        print!(" {:>10}", benchmark);
    }
    println!(" {:>10}", "Average");
    println!("{:-<1$}", "", name_width + 2 + 11 * (leaderboard.benchmarks.len() + 1));

    for row in &leaderboard.rows {
        print!("  {:<width$}", row.model, width = name_width);
        for benchmark in &leaderboard.benchmarks {
            match row.score(benchmark) {
                Some(score) => print!(" {:>10.4}", score),
                None => print!(" {:>10}", "-"),
            }
        }
        println!(" {:>10.4}", row.average);
    }

    println!("\n{:=<50}", "");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Aggregator, TaskScore};

    fn score(model: &str, benchmark: &str, accuracy: f64) -> TaskScore {
        TaskScore {
            model: model.to_string(),
            benchmark: benchmark.to_string(),
            task: format!("{}_t", benchmark),
            correct: 0,
            total: 1,
            error_outputs: 0,
            accuracy,
        }
    }

    #[test]
    fn test_leaderboard_csv_layout() {
        let board = Aggregator::new(vec!["a".to_string(), "b".to_string()]).leaderboard(&[
            score("a", "kobest", 0.5),
            score("b", "kobest", 0.75),
            score("b", "kmmlu", 0.25),
            score("a", "haerae", 1.0),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(leaderboard_file_name("20250101_000000"));
        board.write_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Model,kobest,kmmlu,haerae,Average");
        assert_eq!(lines[1], "a,0.5000,,1.0000,0.7500");
        assert_eq!(lines[2], "b,0.7500,0.2500,,0.5000");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(leaderboard_file_name("20250101_000000"), "leaderboard_20250101_000000.csv");
    }
}
