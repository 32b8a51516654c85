//! Terminal progress bars for evaluation runs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;

use super::executor::{ProgressCallback, Triple, TripleOutcome};

/// One bar for the whole run plus one per active (model, task)
pub struct BarProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    style: ProgressStyle,
    bars: Mutex<HashMap<(String, String), ProgressBar>>,
}

impl BarProgress {
    pub fn new(total_triples: usize) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{prefix:>40} [{bar:30}] {pos}/{len} {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let overall = multi.add(ProgressBar::new(total_triples as u64));
        overall.set_style(style.clone());
        overall.set_prefix("Run");

        Self {
            multi,
            overall,
            style,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn key(triple: &Triple) -> (String, String) {
        (triple.model.clone(), triple.qualified_task())
    }

    pub fn finish(&self) {
        self.overall.finish();
    }
}

impl ProgressCallback for BarProgress {
    fn on_triple_start(&self, triple: &Triple, samples: usize) {
        let bar = self.multi.add(ProgressBar::new(samples as u64));
        bar.set_style(self.style.clone());
        bar.set_prefix(format!("{} {}", triple.model, triple.qualified_task()));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(Self::key(triple), bar);
        }
    }

    fn on_sample_complete(&self, triple: &Triple, completed: usize, _total: usize) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&Self::key(triple)) {
                bar.set_position(completed as u64);
            }
        }
    }

    fn on_triple_complete(&self, triple: &Triple, _outcome: &TripleOutcome) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(&Self::key(triple)) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        }
        self.overall.inc(1);
    }
}
