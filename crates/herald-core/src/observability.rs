//! Status views over the delay queue.

use serde::{Deserialize, Serialize};

use crate::domain::JobState;

/// Job counts per state, as observed at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub delayed: usize,
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, state: JobState) {
        self.add(state, 1);
    }

    pub fn add(&mut self, state: JobState, n: usize) {
        *self.slot(state) += n;
    }

    pub fn get(&self, state: JobState) -> usize {
        match state {
            JobState::Delayed => self.delayed,
            JobState::Waiting => self.waiting,
            JobState::Active => self.active,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
        }
    }

    pub fn live(&self) -> usize {
        self.delayed + self.waiting + self.active
    }

    pub fn total(&self) -> usize {
        self.live() + self.completed + self.failed
    }

    fn slot(&mut self, state: JobState) -> &mut usize {
        match state {
            JobState::Delayed => &mut self.delayed,
            JobState::Waiting => &mut self.waiting,
            JobState::Active => &mut self.active,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
        }
    }
}

/// Aggregate queue statistics returned by the introspection API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub counts: JobCounts,
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_totals() {
        let mut counts = JobCounts::default();
        counts.record(JobState::Delayed);
        counts.record(JobState::Waiting);
        counts.record(JobState::Completed);
        counts.record(JobState::Completed);

        assert_eq!(counts.get(JobState::Completed), 2);
        assert_eq!(counts.live(), 2);
        assert_eq!(counts.total(), 4);
    }
}
