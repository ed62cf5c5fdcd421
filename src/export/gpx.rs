//! # GPX Export
//!
//! Converts a finished binary session log into a GPX 1.1 track.
//!
//! The log is streamed record by record, so memory use does not depend on
//! ride length. Heart rate and cadence go into the Garmin
//! TrackPointExtension; power has no standard home in GPX and is written as
//! a bare `<power>` extension element, which most uploaders accept.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::error::{RecorderError, Result};
use crate::record::decoder::decode_record;
use crate::record::{Record, RecordFlags, RECORD_SIZE};
use crate::session::paths::{with_suffix, SUFFIX_POOL, TRACK_EXTENSION};
use crate::storage::Filesystem;

/// GPX namespaces
const NS_GPX: &str = "http://www.topografix.com/GPX/1/1";
const NS_TPX: &str = "http://www.garmin.com/xmlschemas/TrackPointExtension/v1";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";

/// Time format for `<time>` elements (ISO-8601, UTC)
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

type XmlWriter = Writer<Box<dyn Write + Send>>;

fn xml_err(e: quick_xml::Error) -> RecorderError {
    RecorderError::Xml(e.to_string())
}

/// Default export destination for a log (`<log>.gpx`)
pub fn track_path(log: &Path) -> PathBuf {
    with_suffix(log, TRACK_EXTENSION)
}

/// First unused path derived from `preferred`
///
/// When `preferred` is taken, one character from [`SUFFIX_POOL`] is inserted
/// before the `.gpx` extension (`ride.gpx` → `ride0.gpx`, `ride1.gpx`, ...).
///
/// # Errors
///
/// Returns `ExportNameExhausted` when every candidate exists.
pub fn free_output_path(fs: &dyn Filesystem, preferred: &Path) -> Result<PathBuf> {
    if !fs.exists(preferred) {
        return Ok(preferred.to_path_buf());
    }

    let full = preferred.to_string_lossy();
    let (base, extension) = match full.strip_suffix(TRACK_EXTENSION) {
        Some(base) => (base, TRACK_EXTENSION),
        None => (full.as_ref(), ""),
    };

    SUFFIX_POOL
        .chars()
        .map(|c| PathBuf::from(format!("{}{}{}", base, c, extension)))
        .find(|candidate| !fs.exists(candidate))
        .ok_or_else(|| RecorderError::ExportNameExhausted(preferred.to_path_buf()))
}

/// Fill `buf` from `reader`, returning the byte count (short only at EOF).
fn read_chunk(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// What one pass over a log produced
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportCounts {
    /// Track points written
    pub points: usize,
    /// Valid records left out because they carry no position fix
    pub without_fix: usize,
    /// Records that failed to decode
    pub invalid: usize,
}

impl ExportCounts {
    pub fn skipped(&self) -> usize {
        self.without_fix + self.invalid
    }
}

/// Binary log to GPX converter
#[derive(Debug, Clone)]
pub struct GpxExporter {
    creator: String,
}

impl GpxExporter {
    pub fn new(creator: impl Into<String>) -> Self {
        Self {
            creator: creator.into(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.creator.clone())
    }

    /// Export `log` next to itself as `<log>.gpx` (or a free variant).
    pub fn export_default(&self, fs: &dyn Filesystem, log: &Path) -> Result<PathBuf> {
        self.export(fs, log, &track_path(log))
    }

    /// Export a session log
    ///
    /// # Arguments
    ///
    /// * `fs` - Filesystem holding both files
    /// * `log` - Binary session log
    /// * `out` - Preferred output path; a free variant is used if taken
    ///
    /// # Returns
    ///
    /// * `Result<PathBuf>` - Path the track was written to
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No free output name is left
    /// - The log cannot be opened or read
    /// - Writing the document fails (the partial output is removed)
    /// - The log holds no exportable records (no output is left behind)
    pub fn export(&self, fs: &dyn Filesystem, log: &Path, out: &Path) -> Result<PathBuf> {
        let out = free_output_path(fs, out)?;
        let mut reader = fs.open_read(log)?;
        let writer = fs.create(&out)?;

        info!("Exporting {} to {}", log.display(), out.display());

        let outcome = self.write_document(log, reader.as_mut(), writer);
        let failure = match outcome {
            Ok(counts) if counts.points == 0 => RecorderError::EmptyLog(log.to_path_buf()),
            Ok(counts) => {
                info!(
                    "Exported {} track points to {} ({} records without fix, {} invalid)",
                    counts.points,
                    out.display(),
                    counts.without_fix,
                    counts.invalid
                );
                return Ok(out);
            }
            Err(e) => e,
        };

        warn!("Export of {} failed: {}", log.display(), failure);
        if let Err(e) = fs.remove(&out) {
            warn!("Could not remove partial export {}: {}", out.display(), e);
        }
        Err(failure)
    }

    fn write_document(
        &self,
        log: &Path,
        reader: &mut dyn Read,
        out: Box<dyn Write + Send>,
    ) -> Result<ExportCounts> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);
        let name = log
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.write_header(&mut writer)?;

        let mut chunk = [0u8; RECORD_SIZE];
        let mut counts = ExportCounts::default();
        let mut start: Option<DateTime<Utc>> = None;
        let mut last_timestamp: Option<u32> = None;

        loop {
            let n = read_chunk(reader, &mut chunk)?;
            if n == 0 {
                break;
            }
            if n < RECORD_SIZE {
                warn!("Ignoring {} trailing bytes in {}", n, log.display());
                break;
            }

            let record = match decode_record(&chunk) {
                Ok(record) => record,
                Err(e) => {
                    debug!("Skipping record: {}", e);
                    counts.invalid += 1;
                    continue;
                }
            };
            // The session starts at its first timed record, fix or not
            start = start.or_else(|| record.time());

            if record.timestamp == 0 || !record.flags.contains(RecordFlags::LOCATION) {
                counts.without_fix += 1;
                continue;
            }

            if counts.points == 0 {
                write_track_open(&mut writer, &name, start)?;
            }

            if let Some(previous) = last_timestamp {
                if record.timestamp <= previous {
                    warn!(
                        "Non-monotonic timestamp in {}: {} after {}",
                        log.display(),
                        record.timestamp,
                        previous
                    );
                }
            }
            last_timestamp = Some(record.timestamp);

            write_trackpoint(&mut writer, &record)?;
            counts.points += 1;
        }

        if counts.points > 0 {
            write_end(&mut writer, "trkseg")?;
            write_end(&mut writer, "trk")?;
        }
        write_end(&mut writer, "gpx")?;
        writer.into_inner().flush()?;

        if counts.skipped() > 0 && counts.points > 0 {
            warn!(
                "{}: {} of {} records left out of the track",
                log.display(),
                counts.skipped(),
                counts.skipped() + counts.points
            );
        }
        Ok(counts)
    }

    fn write_header(&self, writer: &mut XmlWriter) -> Result<()> {
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;

        let mut root = BytesStart::new("gpx");
        root.push_attribute(("version", "1.1"));
        root.push_attribute(("creator", self.creator.as_str()));
        root.push_attribute(("xmlns", NS_GPX));
        root.push_attribute(("xmlns:gpxtpx", NS_TPX));
        root.push_attribute(("xmlns:xsi", NS_XSI));
        root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
        writer.write_event(Event::Start(root)).map_err(xml_err)
    }
}

/// Metadata plus the opening of the single track and segment.
///
/// Deferred until the first point; `start` is the first timed record even
/// when that record had no fix.
fn write_track_open(writer: &mut XmlWriter, name: &str, start: Option<DateTime<Utc>>) -> Result<()> {
    write_start(writer, "metadata")?;
    write_element(writer, "name", name)?;
    if let Some(start) = start {
        write_element(writer, "time", &start.format(TIME_FORMAT).to_string())?;
    }
    write_end(writer, "metadata")?;

    write_start(writer, "trk")?;
    write_element(writer, "name", name)?;
    write_element(writer, "type", "cycling")?;
    write_start(writer, "trkseg")
}

fn write_trackpoint(writer: &mut XmlWriter, record: &Record) -> Result<()> {
    let lat = format!("{:.7}", record.latitude());
    let lon = format!("{:.7}", record.longitude());

    let mut trkpt = BytesStart::new("trkpt");
    trkpt.push_attribute(("lat", lat.as_str()));
    trkpt.push_attribute(("lon", lon.as_str()));
    writer.write_event(Event::Start(trkpt)).map_err(xml_err)?;

    if record.flags.contains(RecordFlags::ALTITUDE) {
        write_element(writer, "ele", &record.altitude.to_string())?;
    }
    write_element(writer, "time", &format_time(record))?;

    let power = record.flags.contains(RecordFlags::POWER);
    let hr = record.flags.contains(RecordFlags::HEARTRATE);
    let cadence = record.flags.contains(RecordFlags::CADENCE);

    if power || hr || cadence {
        write_start(writer, "extensions")?;
        if power {
            write_element(writer, "power", &record.power.to_string())?;
        }
        if hr || cadence {
            write_start(writer, "gpxtpx:TrackPointExtension")?;
            if hr {
                write_element(writer, "gpxtpx:hr", &record.heartrate.to_string())?;
            }
            if cadence {
                write_element(writer, "gpxtpx:cad", &record.cadence.to_string())?;
            }
            write_end(writer, "gpxtpx:TrackPointExtension")?;
        }
        write_end(writer, "extensions")?;
    }

    write_end(writer, "trkpt")
}

fn format_time(record: &Record) -> String {
    record
        .time()
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

fn write_start(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)
}

fn write_end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

/// Write a simple text element.
fn write_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    write_start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    write_end(writer, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encoder::encode_records;
    use crate::storage::fs_trait::mocks::MemFilesystem;
    use crate::storage::StdFilesystem;
    use quick_xml::Reader;

    const LOG: &str = "/rides/11142213";
    // 2023-11-14T22:13:20Z
    const T: u32 = 1_700_000_000;

    fn ride_record(timestamp: u32, step: u32) -> Record {
        let mut record = Record::new(timestamp);
        record.set_location(46.0 + step as f64 * 0.0001, 7.0);
        record.set_altitude(500 + step as i16);
        record.set_power(200);
        record.set_cadence(85);
        record.set_heartrate(140);
        record
    }

    fn exporter() -> GpxExporter {
        GpxExporter::new("ride-recorder-test")
    }

    fn put_log(fs: &MemFilesystem, records: &[Record]) {
        fs.put_file(LOG, &encode_records(records));
    }

    /// (trkpt count, trkpt times in order, metadata time)
    fn summarize(xml: &str) -> (usize, Vec<String>, Option<String>) {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut points = 0;
        let mut times = Vec::new();
        let mut metadata_time = None;
        let mut stack: Vec<String> = Vec::new();

        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => {
                    let name = String::from_utf8(e.name().as_ref().to_vec()).unwrap();
                    if name == "trkpt" {
                        points += 1;
                    }
                    stack.push(name);
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(t) => {
                    let text = t.unescape().unwrap().into_owned();
                    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());
                    match (stack.last().map(String::as_str), parent) {
                        (Some("time"), Some("trkpt")) => times.push(text),
                        (Some("time"), Some("metadata")) => metadata_time = Some(text),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        assert!(stack.is_empty(), "unbalanced document");
        (points, times, metadata_time)
    }

    #[test]
    fn test_three_records_three_points() {
        let fs = MemFilesystem::new();
        put_log(&fs, &[ride_record(T, 0), ride_record(T + 1, 1), ride_record(T + 2, 2)]);

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        assert_eq!(out, PathBuf::from("/rides/11142213.gpx"));

        let xml = String::from_utf8(fs.file(&out).unwrap()).unwrap();
        let (points, times, metadata_time) = summarize(&xml);

        assert_eq!(points, 3);
        assert_eq!(
            times,
            vec![
                "2023-11-14T22:13:20Z",
                "2023-11-14T22:13:21Z",
                "2023-11-14T22:13:22Z"
            ]
        );
        assert_eq!(metadata_time.as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn test_trackpoint_contents() {
        let fs = MemFilesystem::new();
        put_log(&fs, &[ride_record(T, 0)]);

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        let xml = String::from_utf8(fs.file(&out).unwrap()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("creator=\"ride-recorder-test\""));
        assert!(xml.contains("<trkpt lat=\"46.0000000\" lon=\"7.0000000\">"));
        assert!(xml.contains("<ele>500</ele>"));
        assert!(xml.contains("<power>200</power>"));
        assert!(xml.contains("<gpxtpx:hr>140</gpxtpx:hr>"));
        assert!(xml.contains("<gpxtpx:cad>85</gpxtpx:cad>"));
        assert!(xml.contains("<name>11142213</name>"));
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let fs = MemFilesystem::new();
        let mut record = Record::new(T);
        record.set_location(1.0, 2.0);
        put_log(&fs, &[record]);

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        let xml = String::from_utf8(fs.file(&out).unwrap()).unwrap();

        assert!(!xml.contains("<ele>"));
        assert!(!xml.contains("<extensions>"));
    }

    #[test]
    fn test_records_without_fix_are_skipped() {
        let fs = MemFilesystem::new();
        let mut no_fix = Record::new(T + 1);
        no_fix.set_power(300);
        put_log(&fs, &[ride_record(T, 0), no_fix, ride_record(T + 2, 2)]);

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        let (points, _, _) = summarize(&String::from_utf8(fs.file(&out).unwrap()).unwrap());
        assert_eq!(points, 2);
    }

    #[test]
    fn test_metadata_time_from_first_record() {
        let fs = MemFilesystem::new();
        // Power meter reports before the first fix arrives
        let mut power_only = Record::new(T);
        power_only.set_power(180);
        put_log(&fs, &[power_only, ride_record(T + 1, 1)]);

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        let (points, times, metadata_time) = summarize(&String::from_utf8(fs.file(&out).unwrap()).unwrap());

        assert_eq!(points, 1);
        assert_eq!(times, vec!["2023-11-14T22:13:21Z"]);
        assert_eq!(metadata_time.as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn test_skipped_records_are_counted() {
        let mut no_fix = Record::new(T + 1);
        no_fix.set_heartrate(150);
        let untimed = Record::new(0);
        let mut bytes = encode_records(&[ride_record(T, 0), no_fix, untimed, ride_record(T + 3, 3)]).to_vec();
        bytes[RECORD_SIZE * 3] = 0xFF;
        let mut reader: &[u8] = &bytes;

        let counts = exporter()
            .write_document(Path::new(LOG), &mut reader, Box::new(io::sink()))
            .unwrap();

        assert_eq!(
            counts,
            ExportCounts {
                points: 1,
                without_fix: 2,
                invalid: 1,
            }
        );
        assert_eq!(counts.skipped(), 3);
    }

    #[test]
    fn test_invalid_records_and_trailing_bytes_skipped() {
        let fs = MemFilesystem::new();
        let mut bytes = encode_records(&[ride_record(T, 0), ride_record(T + 1, 1)]).to_vec();
        bytes[RECORD_SIZE] = 0xFF;
        bytes.extend_from_slice(&[1, 2, 3]);
        fs.put_file(LOG, &bytes);

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        let (points, _, _) = summarize(&String::from_utf8(fs.file(&out).unwrap()).unwrap());
        assert_eq!(points, 1);
    }

    #[test]
    fn test_non_monotonic_timestamps_do_not_abort() {
        let fs = MemFilesystem::new();
        put_log(&fs, &[ride_record(T + 5, 0), ride_record(T, 1), ride_record(T + 6, 2)]);

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        let (points, _, metadata_time) = summarize(&String::from_utf8(fs.file(&out).unwrap()).unwrap());
        assert_eq!(points, 3);
        assert_eq!(metadata_time.as_deref(), Some("2023-11-14T22:13:25Z"));
    }

    #[test]
    fn test_empty_log_leaves_no_output() {
        let fs = MemFilesystem::new();
        fs.put_file(LOG, &[]);

        match exporter().export_default(&fs, Path::new(LOG)) {
            Err(RecorderError::EmptyLog(_)) => {}
            other => panic!("Expected EmptyLog, got: {:?}", other),
        }
        assert!(fs.file("/rides/11142213.gpx").is_none());
    }

    #[test]
    fn test_missing_log() {
        let fs = MemFilesystem::new();
        assert!(matches!(
            exporter().export_default(&fs, Path::new(LOG)),
            Err(RecorderError::Io(_))
        ));
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn test_collision_uses_suffix() {
        let fs = MemFilesystem::new();
        put_log(&fs, &[ride_record(T, 0)]);
        fs.put_file("/rides/11142213.gpx", b"older export");
        fs.put_file("/rides/111422130.gpx", b"older export");

        let out = exporter().export_default(&fs, Path::new(LOG)).unwrap();
        assert_eq!(out, PathBuf::from("/rides/111422131.gpx"));
        assert_eq!(fs.file("/rides/11142213.gpx").unwrap(), b"older export");
    }

    #[test]
    fn test_exhausted_suffix_pool() {
        let fs = MemFilesystem::new();
        put_log(&fs, &[ride_record(T, 0)]);
        fs.put_file("/rides/11142213.gpx", b"x");
        for c in SUFFIX_POOL.chars() {
            fs.put_file(format!("/rides/11142213{}.gpx", c), b"x");
        }
        let before = fs.file_count();

        match exporter().export_default(&fs, Path::new(LOG)) {
            Err(RecorderError::ExportNameExhausted(_)) => {}
            other => panic!("Expected ExportNameExhausted, got: {:?}", other),
        }
        assert_eq!(fs.file_count(), before);
    }

    #[test]
    fn test_output_without_gpx_extension() {
        let fs = MemFilesystem::new();
        fs.put_file("/out/track", b"taken");

        assert_eq!(
            free_output_path(&fs, Path::new("/out/track")).unwrap(),
            PathBuf::from("/out/track0")
        );
    }

    #[test]
    fn test_write_failure_removes_partial_output() {
        let fs = MemFilesystem::new();
        let records: Vec<Record> = (0..20).map(|i| ride_record(T + i, i)).collect();
        put_log(&fs, &records);
        fs.set_writer_fail_after(Some(600));

        match exporter().export_default(&fs, Path::new(LOG)) {
            Err(RecorderError::Xml(_)) | Err(RecorderError::Io(_)) => {}
            other => panic!("Expected write failure, got: {:?}", other),
        }
        assert!(fs.file("/rides/11142213.gpx").is_none());
    }

    #[test]
    fn test_header_write_failure_removes_output() {
        let fs = MemFilesystem::new();
        put_log(&fs, &[ride_record(T, 0)]);
        fs.set_writer_fail_after(Some(10));

        assert!(exporter().export_default(&fs, Path::new(LOG)).is_err());
        assert!(fs.file("/rides/11142213.gpx").is_none());
    }

    #[test]
    fn test_create_failure() {
        let fs = MemFilesystem::new();
        put_log(&fs, &[ride_record(T, 0)]);
        fs.set_create_error(Some(io::ErrorKind::PermissionDenied));

        assert!(matches!(
            exporter().export_default(&fs, Path::new(LOG)),
            Err(RecorderError::Io(_))
        ));
    }

    #[test]
    fn test_export_with_std_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("11142213");
        std::fs::write(&log, encode_records(&[ride_record(T, 0), ride_record(T + 1, 1)])).unwrap();

        let out = exporter().export_default(&StdFilesystem, &log).unwrap();
        let xml = std::fs::read_to_string(&out).unwrap();
        let (points, _, _) = summarize(&xml);
        assert_eq!(points, 2);

        // A second export lands beside the first
        let second = exporter().export_default(&StdFilesystem, &log).unwrap();
        assert_eq!(second, dir.path().join("111422130.gpx"));
    }
}
