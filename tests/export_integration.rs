// Integration tests for the lap table export

use ecolap::analysis::{Acceleration, LapDataProjector};
use ecolap::telemetry::{Sample, SampleLog, TrackIdentifier};
use ecolap::writer::write_lap_rows;
use tempfile::TempDir;

fn sample_log(track: TrackIdentifier) -> SampleLog {
    let mut log = SampleLog::default();
    for (timestamp_ms, speed_kmh) in [(0, 10.), (1000, 20.), (2000, 15.)] {
        log.push_speed(track, Sample::new(timestamp_ms, speed_kmh));
    }
    log
}

#[test]
fn test_export_lap_window() {
    let track = TrackIdentifier::new(7, 2);
    let log = sample_log(track);
    let rows = LapDataProjector::new(&log, 2.0)
        .unwrap()
        .project(track, 0., 10.)
        .unwrap();

    let distances: Vec<f64> = rows.iter().map(|r| r.distance_m).collect();
    assert_eq!(distances, vec![2., 6., 10.]);
    // +10 km/h in one second is beyond a plausible acceleration
    assert_eq!(rows[1].acceleration, Acceleration::NotSignificant);
    assert!(rows[2].acceleration.value().is_some());

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("lap.csv");
    write_lap_rows(&output, &rows).unwrap();

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.len(), 7);
    assert_eq!(&headers[4], "Accélération(m/s²)");
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(&records[2][0], "2000");
    assert_eq!(&records[1][4], "NS");
    assert_eq!(&records[2][2], "10");
}

#[test]
fn test_export_empty_window_overwrites_with_header() {
    let track = TrackIdentifier::new(7, 2);
    let log = sample_log(track);
    let rows = LapDataProjector::new(&log, 2.0)
        .unwrap()
        .project(track, 100., 200.)
        .unwrap();
    assert!(rows.is_empty());

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("lap.csv");
    std::fs::write(&output, "previous export\n1,2,3\n").unwrap();
    write_lap_rows(&output, &rows).unwrap();

    let content = std::fs::read_to_string(&output).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.starts_with("Temps(ms),Temps(s),Distance(m),V(km/h)"));
}
