use log::debug;
use serde::Serialize;
use uom::si::f64::Velocity;
use uom::si::velocity::{kilometer_per_hour, meter_per_second};

use super::{DistancePoint, Sample};
use crate::EcolapError;

/// Series derived from the speed samples of one lap. All four vectors hold one
/// point per input sample, in sample order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Reconstruction {
    /// x = elapsed time (s), y = speed (km/h)
    pub time_speed: Vec<DistancePoint>,
    /// x = distance (m), y = speed (km/h)
    pub distance_speed: Vec<DistancePoint>,
    /// x = time midpoint of the interval (s), y = acceleration (m/s²)
    pub time_acceleration: Vec<DistancePoint>,
    /// x = distance midpoint of the interval (m), y = acceleration (m/s²)
    pub distance_acceleration: Vec<DistancePoint>,
}

impl Reconstruction {
    pub fn len(&self) -> usize {
        self.time_speed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_speed.is_empty()
    }

    /// Distance reached at the last sample, if any.
    pub fn total_distance(&self) -> Option<f64> {
        self.distance_speed.last().map(|p| p.x)
    }
}

/// Turns instantaneous speed samples into a distance axis.
///
/// The distance is integrated from speed, not from GPS fixes. Every increment
/// is snapped to a whole number of wheel revolutions:
/// `trunc(ceil(raw) / perimeter)`, so an increment shorter than one perimeter
/// adds no revolution at all.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Odometer {
    wheel_perimeter: f64,
}

impl Odometer {
    pub fn new(wheel_perimeter: f64) -> Result<Self, EcolapError> {
        if !wheel_perimeter.is_finite() || wheel_perimeter <= 0. {
            return Err(EcolapError::InvalidWheelPerimeter {
                perimeter: wheel_perimeter,
            });
        }
        Ok(Self { wheel_perimeter })
    }

    pub fn wheel_perimeter(&self) -> f64 {
        self.wheel_perimeter
    }

    pub fn reconstruct(&self, samples: &[Sample]) -> Result<Reconstruction, EcolapError> {
        let mut output = Reconstruction {
            time_speed: Vec::with_capacity(samples.len()),
            distance_speed: Vec::with_capacity(samples.len()),
            time_acceleration: Vec::with_capacity(samples.len()),
            distance_acceleration: Vec::with_capacity(samples.len()),
        };

        // The lap is assumed to start exactly on the timing line, one full
        // revolution in.
        let mut last_time_ms: u64 = 0;
        let mut last_speed = 0.;
        let mut revolutions: u64 = 1;

        for sample in samples {
            if sample.timestamp_ms < last_time_ms {
                return Err(EcolapError::UnorderedSamples {
                    previous_ms: last_time_ms,
                    timestamp_ms: sample.timestamp_ms,
                });
            }
            let time = sample.time_s();
            let last_time = last_time_ms as f64 / 1000.;
            let dt = time - last_time;
            let last_pos = revolutions as f64 * self.wheel_perimeter;

            let avg_speed = Velocity::new::<kilometer_per_hour>((sample.speed_kmh + last_speed) / 2.)
                .get::<meter_per_second>();
            let raw_increment = avg_speed * dt;
            let added = (raw_increment.ceil() / self.wheel_perimeter).trunc();
            if added > 0. {
                revolutions = revolutions.saturating_add(added as u64);
            }
            let pos = revolutions as f64 * self.wheel_perimeter;

            let acceleration = if dt > 0. {
                Velocity::new::<kilometer_per_hour>(sample.speed_kmh - last_speed)
                    .get::<meter_per_second>()
                    / dt
            } else {
                0.
            };

            output
                .time_speed
                .push(DistancePoint::new(time, time, sample.speed_kmh));
            output
                .distance_speed
                .push(DistancePoint::new(time, pos, sample.speed_kmh));
            output.time_acceleration.push(DistancePoint::new(
                time,
                (last_time + time) / 2.,
                acceleration,
            ));
            output.distance_acceleration.push(DistancePoint::new(
                time,
                (last_pos + pos) / 2.,
                acceleration,
            ));

            last_time_ms = sample.timestamp_ms;
            last_speed = sample.speed_kmh;
        }

        debug!(
            "Reconstructed {} samples over {:?} m",
            output.len(),
            output.total_distance()
        );
        Ok(output)
    }
}

/// Shorthand for `Odometer::new(wheel_perimeter)?.reconstruct(samples)`.
pub fn reconstruct(samples: &[Sample], wheel_perimeter: f64) -> Result<Reconstruction, EcolapError> {
    Odometer::new(wheel_perimeter)?.reconstruct(samples)
}
