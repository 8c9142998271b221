//! # Adaptive Item Selector
//!
//! Weighted random selection of optimizers. Scores of successful items are
//! eroded towards one, and whenever a new solution is found a new round
//! starts in which every item gets its running average success rate as score.

use rand::{rngs::StdRng, Rng, SeedableRng};

const EROSION: f64 = 0.2;
const MIN_SCORE: f64 = 1e-10;

#[derive(Clone, Debug)]
struct Item {
    name: String,
    score: f64,
    average: f64,
    round_selections: usize,
    round_successes: usize,
    selectable: bool,
}

#[derive(Clone, Debug)]
pub struct AdaptiveItemSelector {
    rng: StdRng,
    items: Vec<Item>,
    selected: Option<usize>,
}

impl AdaptiveItemSelector {
    /// Creates a selector over items given by name and initial score
    pub fn new<S: Into<String>>(seed: u64, items: impl IntoIterator<Item = (S, f64)>) -> Self {
        AdaptiveItemSelector {
            rng: StdRng::seed_from_u64(seed),
            items: items
                .into_iter()
                .map(|(name, score)| {
                    let score = score.max(MIN_SCORE);
                    Item {
                        name: name.into(),
                        score,
                        average: score,
                        round_selections: 0,
                        round_successes: 0,
                        selectable: true,
                    }
                })
                .collect(),
            selected: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.items[idx].name
    }

    pub fn score(&self, idx: usize) -> f64 {
        self.items[idx].score
    }

    pub fn set_selectable(&mut self, idx: usize, selectable: bool) {
        self.items[idx].selectable = selectable;
    }

    /// Draws a selectable item with probability proportional to its score
    pub fn select_item(&mut self) -> Option<usize> {
        let total: f64 = self
            .items
            .iter()
            .filter(|it| it.selectable)
            .map(|it| it.score)
            .sum();
        if total <= 0. {
            self.selected = None;
            return None;
        }
        let mut pick = self.rng.random_range(0.0..total);
        let mut last = None;
        for (idx, item) in self.items.iter().enumerate() {
            if !item.selectable {
                continue;
            }
            last = Some(idx);
            if pick < item.score {
                break;
            }
            pick -= item.score;
        }
        self.selected = last;
        if let Some(idx) = last {
            self.items[idx].round_selections += 1;
        }
        last
    }

    /// Updates the score of the last selected item
    pub fn update_score(&mut self, success: bool) {
        let Some(idx) = self.selected else {
            return;
        };
        let item = &mut self.items[idx];
        if success {
            item.round_successes += 1;
            item.score = (item.score * (1. - EROSION) + EROSION).max(MIN_SCORE);
        }
    }

    /// Re-seeds all scores from the running averages and makes every item
    /// selectable again
    pub fn start_new_round(&mut self) {
        for item in &mut self.items {
            if item.round_selections > 0 {
                let rate = item.round_successes as f64 / item.round_selections as f64;
                item.average = item.average * (1. - EROSION) + EROSION * rate;
            }
            item.score = item.average.max(MIN_SCORE);
            item.round_selections = 0;
            item.round_successes = 0;
            item.selectable = true;
        }
        self.selected = None;
    }
}
