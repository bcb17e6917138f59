use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use log::info;

use crate::{
    EcolapError,
    analysis::LapRow,
    sectors::Sector,
    telemetry::{Position, PositionIndex, SampleSource},
};

pub const LAP_HEADER: [&str; 7] = [
    "Temps(ms)",
    "Temps(s)",
    "Distance(m)",
    "V(km/h)",
    "Accélération(m/s²)",
    "RPM",
    "PW",
];

pub const SECTOR_HEADER: [&str; 7] = [
    "Sector",
    "Start index",
    "End index",
    "Start longitude",
    "Start latitude",
    "End longitude",
    "End latitude",
];

fn create(file: &Path) -> Result<csv::Writer<BufWriter<File>>, EcolapError> {
    let output = File::create(file).map_err(|e| EcolapError::WriterError { source: e })?;
    Ok(csv::Writer::from_writer(BufWriter::new(output)))
}

fn finish<W: Write>(writer: csv::Writer<W>) -> Result<(), EcolapError> {
    let mut inner = writer.into_inner().map_err(|e| EcolapError::WriterError {
        source: e.into_error(),
    })?;
    inner
        .flush()
        .map_err(|e| EcolapError::WriterError { source: e })
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the rows of a lap table to `file`, replacing it. The header is always
/// written, even without rows.
pub fn write_lap_rows(file: &Path, rows: &[LapRow]) -> Result<(), EcolapError> {
    let mut writer = create(file)?;
    write_lap_records(&mut writer, rows)?;
    finish(writer)?;
    info!("Exported {} rows to {:?}", rows.len(), file);
    Ok(())
}

pub fn write_lap_records<W: Write>(
    writer: &mut csv::Writer<W>,
    rows: &[LapRow],
) -> Result<(), EcolapError> {
    writer
        .write_record(LAP_HEADER)
        .map_err(|e| EcolapError::CsvWriterError { source: e })?;
    for row in rows {
        writer
            .write_record([
                row.time_ms.to_string(),
                row.time_s.to_string(),
                row.distance_m.to_string(),
                row.speed_kmh.to_string(),
                row.acceleration.to_string(),
                optional(row.rpm),
                optional(row.pw),
            ])
            .map_err(|e| EcolapError::CsvWriterError { source: e })?;
    }
    Ok(())
}

/// Export the sectors of a competition with the coordinates of their
/// boundaries, one row per sector
pub fn write_sector_config<S: SampleSource + ?Sized>(
    file: &Path,
    sectors: &[Sector],
    source: &S,
) -> Result<(), EcolapError> {
    let mut writer = create(file)?;
    writer
        .write_record(SECTOR_HEADER)
        .map_err(|e| EcolapError::CsvWriterError { source: e })?;

    for sector in sectors {
        let start = boundary(source, sector.start_pos)?;
        let end = boundary(source, sector.end_pos)?;
        writer
            .write_record([
                sector.num.to_string(),
                sector.start_pos.to_string(),
                sector.end_pos.to_string(),
                optional(start.map(|p| p.longitude)),
                optional(start.map(|p| p.latitude)),
                optional(end.map(|p| p.longitude)),
                optional(end.map(|p| p.latitude)),
            ])
            .map_err(|e| EcolapError::CsvWriterError { source: e })?;
    }
    finish(writer)?;
    info!("Exported {} sectors to {:?}", sectors.len(), file);
    Ok(())
}

fn boundary<S: SampleSource + ?Sized>(
    source: &S,
    index: PositionIndex,
) -> Result<Option<Position>, EcolapError> {
    Ok(source.query_position_range(index, index)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Acceleration;
    use crate::telemetry::{SampleLog, TrackIdentifier};
    use tempfile::NamedTempFile;

    fn row(time_ms: u64, acceleration: Acceleration) -> LapRow {
        LapRow {
            time_ms,
            time_s: time_ms as f64 / 1000.,
            distance_m: 12.,
            speed_kmh: 25.5,
            acceleration,
            rpm: None,
            pw: None,
        }
    }

    #[test]
    fn test_empty_projection_writes_header_only() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "stale content\nmore\n").unwrap();

        write_lap_rows(file.path(), &[]).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(
            content,
            "Temps(ms),Temps(s),Distance(m),V(km/h),Accélération(m/s²),RPM,PW\n"
        );
    }

    #[test]
    fn test_rows_and_not_significant_marker() {
        let file = NamedTempFile::new().unwrap();
        let rows = [
            row(1000, Acceleration::Value(0.5)),
            row(2000, Acceleration::NotSignificant),
        ];
        write_lap_rows(file.path(), &rows).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1000,1,12,25.5,0.5,,");
        assert_eq!(lines[2], "2000,2,12,25.5,NS,,");
    }

    #[test]
    fn test_sector_config_export() {
        let mut log = SampleLog::default();
        let track = TrackIdentifier::new(1, 1);
        for id in 10..15 {
            log.push_position(
                track,
                Position {
                    id,
                    longitude: 0.5,
                    latitude: 43. + id as f64 / 100.,
                    timestamp_ms: id as u64 * 100,
                },
            );
        }
        let sectors = [Sector::new("Nogaro", 0, 10, 12), Sector::new("Nogaro", 1, 13, 20)];
        let file = NamedTempFile::new().unwrap();
        write_sector_config(file.path(), &sectors, &log).unwrap();

        let mut reader = csv::Reader::from_path(file.path()).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "0");
        assert_eq!(&records[0][1], "10");
        assert_eq!(&records[0][3], "0.5");
        // no fix recorded at index 20
        assert_eq!(&records[1][5], "");
    }
}
