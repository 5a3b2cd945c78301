use std::fmt;

/// Top label of one classification.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassificationResult {
    label: String,
    confidence: f32,
}

impl ClassificationResult {
    /// Confidence is clamped to `[0, 1]`; non-finite values become 0.
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            label: label.into(),
            confidence,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Highest-scoring label. The first of equal scores wins; non-finite
    /// scores are skipped.
    pub fn top(labels: &[String], scores: &[f32]) -> Self {
        let mut best: Option<(usize, f32)> = None;
        for (index, &score) in scores.iter().enumerate().take(labels.len()) {
            if !score.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((index, score));
            }
        }
        match best {
            Some((index, score)) => Self::new(labels[index].clone(), score),
            None => Self::empty(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.3})", self.label, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn first_maximum_wins() {
        let result = ClassificationResult::top(&labels(&["a", "b", "c"]), &[0.2, 0.4, 0.4]);
        assert_eq!(result.label(), "b");
        assert!((result.confidence() - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn skips_nan_and_clamps() {
        let result = ClassificationResult::top(&labels(&["a", "b"]), &[f32::NAN, 3.5]);
        assert_eq!(result.label(), "b");
        assert_eq!(result.confidence(), 1.0);
        assert!(ClassificationResult::top(&labels(&["a"]), &[f32::NAN]).is_empty());
    }

    #[test]
    fn empty_result() {
        let result = ClassificationResult::empty();
        assert_eq!(result.label(), "");
        assert_eq!(result.confidence(), 0.0);
    }
}
