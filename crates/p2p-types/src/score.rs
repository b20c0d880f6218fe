use serde::{Deserialize, Serialize};

/// A reputation score, always held in `[0.0, 100.0]`.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score(f64);

impl Score {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;
    pub const NEUTRAL: f64 = 50.0;

    pub fn new(value: f64) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Score {
    fn default() -> Self {
        Self(Self::NEUTRAL)
    }
}

impl std::fmt::Debug for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_range() {
        assert_eq!(Score::new(-10.0).value(), 0.0);
        assert_eq!(Score::new(1000.0).value(), 100.0);
        assert_eq!(Score::new(42.5).value(), 42.5);
    }
}
