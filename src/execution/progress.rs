//! Progress snapshots for display steps.

use serde::Serialize;

use crate::core::task::{ProgressView, StepProgress};

/// Point-in-time view of a pipeline's display steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// `"<prefix> ... NN%"` lines for every step that has begun, in tree order.
    /// A parallel group contributes its own prefix as a header line first.
    pub lines: Vec<String>,
    /// Share of steps at 100%, rounded down. 0 when there are no steps.
    pub percent: u8,
}

impl ProgressSnapshot {
    /// Aggregate the progress views of a composite's direct children.
    pub fn from_views<I>(views: I) -> Self
    where
        I: IntoIterator<Item = ProgressView>,
    {
        let mut tally = Tally::default();
        let mut lines = Vec::new();

        for view in views {
            match view {
                ProgressView::Step(step) => lines.extend(tally.count(&step)),
                ProgressView::Group { prefix, steps } => {
                    let group: Vec<String> =
                        steps.iter().filter_map(|step| tally.count(step)).collect();
                    if !group.is_empty() {
                        lines.push(prefix);
                        lines.extend(group);
                    }
                }
            }
        }

        Self {
            lines,
            percent: tally.percent(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}

#[derive(Default)]
struct Tally {
    total: usize,
    finished: usize,
}

impl Tally {
    fn count(&mut self, step: &StepProgress) -> Option<String> {
        self.total += 1;
        if step.is_finished() {
            self.finished += 1;
        }
        step.status_line()
    }

    fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        // finished <= total, so this never exceeds 100
        (self.finished * 100 / self.total) as u8
    }
}
