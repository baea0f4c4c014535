//! Sensor readings from CSV files
//!
//! Expected CSV format (header optional):
//! `timestamp,machine_id,sensor_id,sensor_type,value`
//!
//! Timestamps may be RFC 3339, naive ISO 8601 (taken as UTC) or Unix epoch
//! seconds. Sensor type labels are normalized on load.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::types::{Reading, SensorType};

pub const CSV_HEADER: &str = "timestamp,machine_id,sensor_id,sensor_type,value";

/// Read sensor readings from a CSV file.
///
/// Malformed lines are logged and skipped; only failing to open the file is
/// an error.
pub fn read_csv_data(path: &Path) -> io::Result<Vec<Reading>> {
    let file = File::open(path)?;
    let readings = read_csv_from(BufReader::new(file));
    tracing::info!(count = readings.len(), path = %path.display(), "Loaded readings from CSV");
    Ok(readings)
}

/// Read sensor readings from any buffered source.
pub fn read_csv_from<R: BufRead>(reader: R) -> Vec<Reading> {
    let mut readings = Vec::new();

    for (index, line_result) in reader.lines().enumerate() {
        let line_num = index + 1;

        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "Error reading CSV line");
                continue;
            }
        };

        if line_num == 1 && line.starts_with("timestamp") {
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        match parse_csv_line(&line, line_num) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "Error parsing CSV line");
            }
        }
    }

    readings
}

/// Write readings as CSV, header included.
pub fn write_csv<W: Write>(mut writer: W, readings: &[Reading]) -> io::Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for r in readings {
        writeln!(
            writer,
            "{},{},{},{},{}",
            r.timestamp.to_rfc3339(),
            r.machine_id,
            r.sensor_id,
            r.sensor_type,
            r.value
        )?;
    }
    writer.flush()
}

fn parse_csv_line(line: &str, line_num: usize) -> Result<Reading, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();

    if fields.len() < 5 {
        return Err(format!(
            "Expected 5 fields, got {} on line {}",
            fields.len(),
            line_num
        ));
    }

    let timestamp = parse_timestamp(fields[0])?;
    let machine_id = non_empty(fields[1], "machine_id")?;
    let sensor_id = non_empty(fields[2], "sensor_id")?;
    let sensor_type = SensorType::from_label(non_empty(fields[3], "sensor_type")?);
    let value = parse_f64(fields[4], "value")?;

    if !value.is_finite() {
        return Err(format!("Non-finite value '{}' on line {}", fields[4], line_num));
    }

    Ok(Reading::new(machine_id, sensor_id, sensor_type, value, timestamp))
}

/// Parse an RFC 3339, naive ISO 8601 (UTC assumed) or epoch-seconds timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();

    if let Ok(epoch) = s.parse::<i64>() {
        return Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| format!("Epoch timestamp out of range: '{s}'"));
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            s.parse::<NaiveDateTime>()
                .map(|naive| naive.and_utc())
                .map_err(|e| format!("Cannot parse timestamp '{s}': {e}"))
        })
}

fn parse_f64(s: &str, field: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| format!("Cannot parse {field} as f64: '{s}'"))
}

fn non_empty<'a>(s: &'a str, field: &str) -> Result<&'a str, String> {
    if s.is_empty() {
        Err(format!("Empty {field}"))
    } else {
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 18, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-18T08:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-18T10:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-18T08:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("1705564800").unwrap(), expected);
        assert!(parse_timestamp("not-a-time").is_err());
    }

    #[test]
    fn test_read_csv_skips_bad_lines() {
        let csv = "\
timestamp,machine_id,sensor_id,sensor_type,value
2024-01-18T08:00:00Z,press-01,t1,Motor Temp,41.5
2024-01-18T08:05:00Z,press-01,v1,vibration,abc
garbage
2024-01-18T08:10:00Z,press-01,v1,vibration,NaN

2024-01-18T08:15:00Z,press-01,h1,RH,52
";
        let readings = read_csv_from(csv.as_bytes());
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].sensor_type, SensorType::Temperature);
        assert_eq!(readings[1].sensor_type, SensorType::Humidity);
        assert_eq!(readings[1].value, 52.0);
    }

    #[test]
    fn test_write_then_read_preserves_readings() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let readings = vec![
            Reading::new("m1", "s1", SensorType::Tension, 151.25, ts),
            Reading::new("m1", "s2", SensorType::Other("flow".into()), 3.0, ts),
        ];

        let mut buf = Vec::new();
        write_csv(&mut buf, &readings).unwrap();
        let parsed = read_csv_from(buf.as_slice());

        assert_eq!(parsed, readings);
    }
}
