use itertools::{Itertools, MinMaxResult};
use log::debug;
use serde::Serialize;

use crate::EcolapError;
use crate::sectors::Sector;
use crate::telemetry::{PlanarPoint, Position, PositionIndex, SampleSource, TrackIdentifier, project};

/// Speed range of a lap within one sector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectorSpeeds {
    pub num: u32,
    /// Lap time (s) at which the sector is entered and left, when both
    /// boundaries could be matched in order on the lap
    pub window: Option<(f64, f64)>,
    pub min_kmh: Option<f64>,
    pub max_kmh: Option<f64>,
    /// Speed samples inside the window
    pub samples: usize,
}

impl SectorSpeeds {
    fn unmatched(num: u32) -> Self {
        Self {
            num,
            window: None,
            min_kmh: None,
            max_kmh: None,
            samples: 0,
        }
    }
}

/// Minimum and maximum speed of `track` in every sector.
///
/// Sectors are delimited by fixes of the reference lap. Each boundary is
/// matched to the closest fix of `track`, whose timestamp bounds the speed
/// samples taken into account.
pub fn sector_speeds<S: SampleSource + ?Sized>(
    source: &S,
    track: TrackIdentifier,
    sectors: &[Sector],
) -> Result<Vec<SectorSpeeds>, EcolapError> {
    let fixes: Vec<(PlanarPoint, u64)> = source
        .query_positions(track)?
        .iter()
        .map(|p| (project(p.longitude, p.latitude), p.timestamp_ms))
        .collect();
    let samples = source.query_speed(track, None)?;

    let mut stats = Vec::with_capacity(sectors.len());
    for sector in sectors {
        let entry = boundary_time(source, &fixes, sector.start_pos)?;
        let exit = boundary_time(source, &fixes, sector.end_pos)?;
        let (Some(entry), Some(exit)) = (entry, exit) else {
            debug!("Sector {} has no matching fix on {}", sector.num, track);
            stats.push(SectorSpeeds::unmatched(sector.num));
            continue;
        };
        if entry > exit {
            debug!("Sector {} is crossed backwards on {}", sector.num, track);
            stats.push(SectorSpeeds::unmatched(sector.num));
            continue;
        }

        let speeds: Vec<f64> = samples
            .iter()
            .filter(|s| s.timestamp_ms >= entry && s.timestamp_ms <= exit)
            .map(|s| s.speed_kmh)
            .collect();
        let (min_kmh, max_kmh) = match speeds.iter().minmax_by(|a, b| a.total_cmp(b)) {
            MinMaxResult::NoElements => (None, None),
            MinMaxResult::OneElement(v) => (Some(*v), Some(*v)),
            MinMaxResult::MinMax(min, max) => (Some(*min), Some(*max)),
        };
        stats.push(SectorSpeeds {
            num: sector.num,
            window: Some((entry as f64 / 1000., exit as f64 / 1000.)),
            min_kmh,
            max_kmh,
            samples: speeds.len(),
        });
    }
    Ok(stats)
}

/// Timestamp of the fix of the lap closest to the reference fix `index`
fn boundary_time<S: SampleSource + ?Sized>(
    source: &S,
    fixes: &[(PlanarPoint, u64)],
    index: PositionIndex,
) -> Result<Option<u64>, EcolapError> {
    let Some(reference) = source.query_position_range(index, index)?.first().copied() else {
        return Ok(None);
    };
    let target = planar(&reference);
    Ok(fixes
        .iter()
        .min_by(|(a, _), (b, _)| squared_distance(a, &target).total_cmp(&squared_distance(b, &target)))
        .map(|(_, timestamp_ms)| *timestamp_ms))
}

fn planar(position: &Position) -> PlanarPoint {
    project(position.longitude, position.latitude)
}

fn squared_distance(a: &PlanarPoint, b: &PlanarPoint) -> f64 {
    (a.x - b.x).powi(2) + (a.y - b.y).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Sample, SampleLog};

    const REFERENCE: TrackIdentifier = TrackIdentifier { race: 1, lap: 1 };
    const OTHER: TrackIdentifier = TrackIdentifier { race: 1, lap: 2 };

    /// Two laps over the same ten fixes, one per second. The second lap starts
    /// at 30 s on the log clock and runs 1 km/h faster.
    fn two_laps() -> SampleLog {
        let mut log = SampleLog::default();
        for (lap, offset_ms, first_id, boost) in [(REFERENCE, 0, 0, 0.), (OTHER, 30_000, 100, 1.)] {
            for i in 0..10u64 {
                let timestamp_ms = offset_ms + i * 1000;
                log.push_position(
                    lap,
                    Position {
                        id: first_id + i as i64,
                        longitude: 0.1 + i as f64 * 1e-4,
                        latitude: 43.7,
                        timestamp_ms,
                    },
                );
                let speed = [20., 25., 30., 22., 18., 35., 40., 38., 21., 19.][i as usize];
                log.push_speed(lap, Sample::new(timestamp_ms, speed + boost));
            }
        }
        log
    }

    #[test]
    fn test_reference_lap_speeds() {
        let log = two_laps();
        let sectors = [Sector::new("Nogaro", 0, 0, 4), Sector::new("Nogaro", 1, 5, 9)];
        let stats = sector_speeds(&log, REFERENCE, &sectors).unwrap();

        assert_eq!(stats[0].window, Some((0., 4.)));
        assert_eq!((stats[0].min_kmh, stats[0].max_kmh), (Some(18.), Some(30.)));
        assert_eq!(stats[0].samples, 5);
        assert_eq!((stats[1].min_kmh, stats[1].max_kmh), (Some(19.), Some(40.)));
    }

    #[test]
    fn test_other_lap_is_matched_on_position() {
        let log = two_laps();
        let sectors = [Sector::new("Nogaro", 0, 2, 3)];
        let stats = sector_speeds(&log, OTHER, &sectors).unwrap();

        assert_eq!(stats[0].window, Some((2., 3.)));
        assert_eq!((stats[0].min_kmh, stats[0].max_kmh), (Some(23.), Some(31.)));
        assert_eq!(stats[0].samples, 2);
    }

    #[test]
    fn test_unknown_boundary_has_no_stats() {
        let log = two_laps();
        let sectors = [Sector::new("Nogaro", 0, 5, 500)];
        let stats = sector_speeds(&log, REFERENCE, &sectors).unwrap();
        assert_eq!(stats, vec![SectorSpeeds::unmatched(0)]);

        let without_fixes = sector_speeds(&log, TrackIdentifier::new(9, 1), &sectors).unwrap();
        assert_eq!(without_fixes[0].window, None);
    }

    #[test]
    fn test_backwards_sector_has_no_stats() {
        let log = two_laps();
        let stats = sector_speeds(&log, REFERENCE, &[Sector::new("Nogaro", 0, 7, 2)]).unwrap();
        assert_eq!(stats[0].window, None);
        assert_eq!(stats[0].samples, 0);
    }
}
