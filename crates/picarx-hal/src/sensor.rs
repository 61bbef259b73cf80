//! The `SensorGateway` trait: ultrasonic distance, grayscale, camera, state.
//!
//! Readings are taken fresh on every call.  Reads never mutate actuators, so
//! the trait works on `&self` and may be shared freely across threads while
//! a navigator holds the actuator lock.

use picarx_types::{PicarError, RobotState};

use crate::camera::Snapshot;

/// Lowest distance the ultrasonic module reports reliably, in cm.
pub const ULTRASONIC_MIN_CM: f32 = 2.0;
/// Highest distance the ultrasonic module reports reliably, in cm.
pub const ULTRASONIC_MAX_CM: f32 = 400.0;

/// Whether `reading` lies inside the ultrasonic module's reliable range.
pub fn is_valid_distance(reading: f32) -> bool {
    reading.is_finite() && (ULTRASONIC_MIN_CM..=ULTRASONIC_MAX_CM).contains(&reading)
}

pub trait SensorGateway: Send + Sync {
    /// Forward distance in centimetres.
    ///
    /// # Errors
    ///
    /// Returns [`PicarError::SensorUnavailable`] when the ultrasonic module
    /// does not answer.
    fn read_distance(&self) -> Result<f32, PicarError>;

    /// Three grayscale channels (left, middle, right).
    fn read_grayscale(&self) -> Result<[f32; 3], PicarError>;

    /// Capture one camera frame.
    fn capture_snapshot(&self) -> Result<Snapshot, PicarError>;

    /// Current servo angles, motor speed and the latest readings.
    fn robot_state(&self) -> Result<RobotState, PicarError>;

    /// Median of up to `samples` readings that fall inside the reliable
    /// range.  Out-of-range echoes are discarded.
    ///
    /// # Errors
    ///
    /// [`PicarError::SensorUnavailable`] when no sample was usable.
    fn read_distance_stable(&self, samples: usize) -> Result<f32, PicarError> {
        let mut valid = Vec::with_capacity(samples);
        for _ in 0..samples.max(1) {
            let reading = self.read_distance()?;
            if is_valid_distance(reading) {
                valid.push(reading);
            }
        }
        if valid.is_empty() {
            return Err(PicarError::SensorUnavailable {
                sensor: "ultrasonic".into(),
                details: format!("no reading within {ULTRASONIC_MIN_CM}-{ULTRASONIC_MAX_CM} cm"),
            });
        }
        valid.sort_by(f32::total_cmp);
        Ok(valid[valid.len() / 2])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::camera::ImageEncoding;

    struct Scripted {
        readings: Mutex<Vec<f32>>,
    }

    impl Scripted {
        fn new(mut readings: Vec<f32>) -> Self {
            readings.reverse();
            Self {
                readings: Mutex::new(readings),
            }
        }
    }

    impl SensorGateway for Scripted {
        fn read_distance(&self) -> Result<f32, PicarError> {
            self.readings
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| PicarError::SensorUnavailable {
                    sensor: "ultrasonic".into(),
                    details: "script exhausted".into(),
                })
        }

        fn read_grayscale(&self) -> Result<[f32; 3], PicarError> {
            Ok([0.0; 3])
        }

        fn capture_snapshot(&self) -> Result<Snapshot, PicarError> {
            Ok(Snapshot::new(1, 1, ImageEncoding::Gray8, vec![0]))
        }

        fn robot_state(&self) -> Result<RobotState, PicarError> {
            Ok(RobotState::default())
        }
    }

    #[test]
    fn stable_reading_discards_outliers() {
        let sensor = Scripted::new(vec![50.0, -1.0, 52.0, 900.0, 51.0]);
        assert_eq!(sensor.read_distance_stable(5).unwrap(), 51.0);
    }

    #[test]
    fn stable_reading_fails_when_all_invalid() {
        let sensor = Scripted::new(vec![-2.0, 0.5, 1000.0]);
        let err = sensor.read_distance_stable(3).unwrap_err();
        assert!(matches!(err, PicarError::SensorUnavailable { .. }));
    }

    #[test]
    fn valid_range_is_inclusive() {
        assert!(is_valid_distance(2.0));
        assert!(is_valid_distance(400.0));
        assert!(!is_valid_distance(400.1));
        assert!(!is_valid_distance(f32::INFINITY));
    }
}
