use serde::{Deserialize, Serialize};

/// Running tally of confirmation answers, used as a session-quality signal
/// for the extraction backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyTracker {
    positive_responses: u32,
    negative_responses: u32,
}

impl AccuracyTracker {
    pub fn record(&mut self, confirmed: bool) {
        if confirmed {
            self.positive_responses = self.positive_responses.saturating_add(1);
        } else {
            self.negative_responses = self.negative_responses.saturating_add(1);
        }
    }

    pub fn positive_responses(&self) -> u32 {
        self.positive_responses
    }

    pub fn negative_responses(&self) -> u32 {
        self.negative_responses
    }

    /// `None` until at least one confirmation has been answered, so "no data"
    /// is never reported as 0%.
    pub fn ratio(&self) -> Option<f64> {
        let total = u64::from(self.positive_responses) + u64::from(self.negative_responses);
        (total > 0).then(|| f64::from(self.positive_responses) / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::AccuracyTracker;

    #[test]
    fn ratio_is_undefined_without_answers() {
        assert_eq!(AccuracyTracker::default().ratio(), None);
    }

    #[test]
    fn three_confirmations_and_one_denial_give_three_quarters() {
        let mut tracker = AccuracyTracker::default();
        for confirmed in [true, true, false, true] {
            tracker.record(confirmed);
        }

        assert_eq!(tracker.positive_responses(), 3);
        assert_eq!(tracker.negative_responses(), 1);
        assert_eq!(tracker.ratio(), Some(0.75));
    }

    #[test]
    fn only_denials_give_zero() {
        let mut tracker = AccuracyTracker::default();
        tracker.record(false);
        assert_eq!(tracker.ratio(), Some(0.0));
    }
}
