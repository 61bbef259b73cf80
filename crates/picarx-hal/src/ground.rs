//! Grayscale ground classification: safe floor, line, or cliff edge.
//!
//! The three downward-facing photo sensors report reflected light.  A
//! reading at or below the cliff reference on any channel means the sensor
//! sees nothing underneath (a table edge or stair); a reading at or below the
//! line reference means a dark line on the floor.

/// Ground under the robot as inferred from one grayscale sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundStatus {
    Safe,
    Line,
    Cliff,
}

/// Per-channel reference values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundReference {
    pub cliff: [f32; 3],
    pub line: [f32; 3],
}

impl Default for GroundReference {
    fn default() -> Self {
        Self {
            cliff: [200.0; 3],
            line: [1000.0; 3],
        }
    }
}

impl GroundReference {
    /// Keep the default line reference and override the cliff reference.
    pub fn with_cliff(cliff: [f32; 3]) -> Self {
        Self {
            cliff,
            ..Self::default()
        }
    }

    pub fn classify(&self, grayscale: [f32; 3]) -> GroundStatus {
        let below = |values: &[f32; 3]| grayscale.iter().zip(values).any(|(v, r)| v <= r);
        if below(&self.cliff) {
            GroundStatus::Cliff
        } else if below(&self.line) {
            GroundStatus::Line
        } else {
            GroundStatus::Safe
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bright_floor_is_safe() {
        let reference = GroundReference::default();
        assert_eq!(reference.classify([1400.0, 1350.0, 1420.0]), GroundStatus::Safe);
    }

    #[test]
    fn one_dark_channel_is_a_line() {
        let reference = GroundReference::default();
        assert_eq!(reference.classify([1400.0, 800.0, 1420.0]), GroundStatus::Line);
    }

    #[test]
    fn cliff_wins_over_line() {
        let reference = GroundReference::default();
        assert_eq!(reference.classify([150.0, 800.0, 1420.0]), GroundStatus::Cliff);
    }

    #[test]
    fn custom_cliff_reference() {
        let reference = GroundReference::with_cliff([50.0; 3]);
        assert_eq!(reference.classify([150.0, 1200.0, 1200.0]), GroundStatus::Line);
    }
}
