//! Start-time readers for each sensor file format.
//!
//! Every family implements [`SensorParser`]; [`parser_for`] picks the
//! implementation at the call site. Only the first datagram, packet, trace or
//! row of a file is read.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use splsensors_core::error::{Result, SplError};
use splsensors_core::models::SensorFamily;
use splsensors_core::time_utils::TimestampProcessor;
use tracing::debug;

/// SSS files below this size are skipped rather than parsed.
pub const XTF_MIN_FILE_SIZE: u64 = 1024 * 1024;

/// Reads a sensor file's recording start time.
pub trait SensorParser {
    fn family(&self) -> SensorFamily;

    /// Start instant of the recording in `path`.
    fn parse(&self, path: &Path) -> Result<DateTime<Utc>>;
}

/// Parser implementation for `family`.
pub fn parser_for(family: SensorFamily) -> Box<dyn SensorParser> {
    match family {
        SensorFamily::Mbes => Box::new(AllParser),
        SensorFamily::Sss => Box::new(XtfParser),
        SensorFamily::Sbp | SensorFamily::Suhrs => Box::new(SegyParser::new(family)),
        SensorFamily::Mag => Box::new(MagCsvParser),
    }
}

/// Files smaller than this are routed to the skipped set for `family`.
pub fn min_file_size(family: SensorFamily) -> Option<u64> {
    match family {
        SensorFamily::Sss => Some(XTF_MIN_FILE_SIZE),
        _ => None,
    }
}

// ── MBES (.all) ───────────────────────────────────────────────────────────────

const ALL_STX: u8 = 0x02;
const ALL_HEADER_LEN: u64 = 16;

/// Kongsberg EM `.all`: date and time of the first datagram header.
#[derive(Debug, Clone, Copy)]
pub struct AllParser;

impl SensorParser for AllParser {
    fn family(&self) -> SensorFamily {
        SensorFamily::Mbes
    }

    fn parse(&self, path: &Path) -> Result<DateTime<Utc>> {
        let buf = read_head(path, ALL_HEADER_LEN)?;
        if buf.len() < ALL_HEADER_LEN as usize {
            return Err(SplError::sensor_parse(path, "file shorter than a datagram header"));
        }
        if buf[4] != ALL_STX {
            return Err(SplError::sensor_parse(
                path,
                format!("datagram STX is 0x{:02X}, expected 0x02", buf[4]),
            ));
        }

        let date = le_u32(&buf, 8).unwrap_or_default();
        let millis = le_u32(&buf, 12).unwrap_or_default();
        TimestampProcessor::from_date_and_millis(date, millis).ok_or_else(|| {
            SplError::sensor_parse(path, format!("invalid datagram date {date} / time {millis}"))
        })
    }
}

// ── SSS (.xtf) ────────────────────────────────────────────────────────────────

const XTF_MAGIC: u16 = 0xFACE;
const XTF_HEADER_BLOCK: usize = 1024;
const XTF_CHANNEL_INFO_LEN: usize = 128;
const XTF_FIXED_HEADER_LEN: usize = 256;
/// Packet types carrying the ping header layout (sonar, bathymetry).
const XTF_PING_TYPES: [u8; 2] = [0, 2];
const XTF_SCAN_LIMIT: u64 = 16 * 1024 * 1024;

/// Triton `.xtf`: time fields of the first ping packet.
#[derive(Debug, Clone, Copy)]
pub struct XtfParser;

impl XtfParser {
    /// Length of the file header, including extra channel-info blocks.
    fn header_len(buf: &[u8]) -> usize {
        let sonar = le_u16(buf, 166).unwrap_or_default() as usize;
        let bathy = le_u16(buf, 168).unwrap_or_default() as usize;
        let channels = sonar + bathy;
        if channels <= 6 {
            return XTF_HEADER_BLOCK;
        }
        let raw = XTF_FIXED_HEADER_LEN + XTF_CHANNEL_INFO_LEN * channels;
        raw.div_ceil(XTF_HEADER_BLOCK) * XTF_HEADER_BLOCK
    }

    fn ping_time(packet: &[u8]) -> Option<DateTime<Utc>> {
        let year = le_u16(packet, 14)?;
        let b = packet.get(16..22)?;
        TimestampProcessor::from_calendar(
            i32::from(year),
            u32::from(b[0]),
            u32::from(b[1]),
            u32::from(b[2]),
            u32::from(b[3]),
            u32::from(b[4]),
            u32::from(b[5]),
        )
    }
}

impl SensorParser for XtfParser {
    fn family(&self) -> SensorFamily {
        SensorFamily::Sss
    }

    fn parse(&self, path: &Path) -> Result<DateTime<Utc>> {
        let buf = read_head(path, XTF_SCAN_LIMIT)?;
        if buf.len() < XTF_HEADER_BLOCK {
            return Err(SplError::sensor_parse(path, "file shorter than the XTF file header"));
        }

        let mut pos = Self::header_len(&buf);
        while pos + 22 <= buf.len() {
            if le_u16(&buf, pos) != Some(XTF_MAGIC) {
                // Resynchronise on the next magic number.
                pos += 1;
                continue;
            }
            let header_type = buf[pos + 2];
            let record_len = le_u32(&buf, pos + 10).unwrap_or_default() as usize;

            if XTF_PING_TYPES.contains(&header_type) {
                if let Some(ts) = Self::ping_time(&buf[pos..]) {
                    return Ok(ts);
                }
                debug!("{}: ping packet at {} has an invalid date", path.display(), pos);
            }
            pos += record_len.max(2);
        }

        Err(SplError::sensor_parse(path, "no ping packet found"))
    }
}

// ── SBP / SUHRS (SEG-Y) ───────────────────────────────────────────────────────

const SEGY_TEXT_HEADER_LEN: usize = 3200;
const SEGY_BINARY_HEADER_LEN: usize = 400;
const SEGY_TRACE_HEADER_LEN: usize = 240;
const SEGY_FORMAT_CODE_OFFSET: usize = 3224;
const SEGY_EXTENDED_HEADERS_OFFSET: usize = 3504;

/// SEG-Y rev1: recording time of the first trace header.
///
/// An unreadable trace date falls back to the Unix epoch so the file still
/// yields an observation; the wrong-timestamp pass then reports it.
#[derive(Debug, Clone, Copy)]
pub struct SegyParser {
    family: SensorFamily,
}

impl SegyParser {
    pub fn new(family: SensorFamily) -> Self {
        Self { family }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    fn i16_at(self, buf: &[u8], offset: usize) -> Option<i16> {
        let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Big => i16::from_be_bytes(bytes),
            ByteOrder::Little => i16::from_le_bytes(bytes),
        })
    }
}

impl SensorParser for SegyParser {
    fn family(&self) -> SensorFamily {
        self.family
    }

    fn parse(&self, path: &Path) -> Result<DateTime<Utc>> {
        let head_len = SEGY_TEXT_HEADER_LEN + SEGY_BINARY_HEADER_LEN;
        let head = read_head(path, head_len as u64)?;
        if head.len() < head_len {
            return Err(SplError::sensor_parse(path, "file shorter than the SEG-Y headers"));
        }

        let order = match ByteOrder::Big.i16_at(&head, SEGY_FORMAT_CODE_OFFSET) {
            Some(code) if (1..=16).contains(&code) => ByteOrder::Big,
            _ => ByteOrder::Little,
        };
        let extended = order
            .i16_at(&head, SEGY_EXTENDED_HEADERS_OFFSET)
            .unwrap_or_default()
            .max(0) as usize;

        let trace_start = head_len + extended * SEGY_TEXT_HEADER_LEN;
        let buf = read_head(path, (trace_start + SEGY_TRACE_HEADER_LEN) as u64)?;
        let Some(trace) = buf.get(trace_start..trace_start + SEGY_TRACE_HEADER_LEN) else {
            return Err(SplError::sensor_parse(path, "no trace header"));
        };

        let field = |offset: usize| order.i16_at(trace, offset).unwrap_or_default();
        let year = normalise_year(field(156));
        let (doy, hour, minute, second) = (field(158), field(160), field(162), field(164));

        let ts = u32::try_from(doy).ok().and_then(|doy| {
            TimestampProcessor::from_ordinal(
                year,
                doy,
                u32::try_from(hour).ok()?,
                u32::try_from(minute).ok()?,
                u32::try_from(second).ok()?,
            )
        });
        Ok(ts.unwrap_or_else(|| {
            debug!(
                "{}: trace date {}-{:03} {}:{}:{} is invalid, using epoch",
                path.display(),
                year,
                doy,
                hour,
                minute,
                second
            );
            DateTime::<Utc>::default()
        }))
    }
}

/// Two-digit years are windowed around 1950.
fn normalise_year(year: i16) -> i32 {
    match year {
        0..=49 => 2000 + i32::from(year),
        50..=99 => 1900 + i32::from(year),
        _ => i32::from(year),
    }
}

// ── MAG (.csv) ────────────────────────────────────────────────────────────────

/// Magnetometer CSV: `Date` and `Time` columns of the first data row.
#[derive(Debug, Clone, Copy)]
pub struct MagCsvParser;

impl SensorParser for MagCsvParser {
    fn family(&self) -> SensorFamily {
        SensorFamily::Mag
    }

    fn parse(&self, path: &Path) -> Result<DateTime<Utc>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let (Some(date_idx), Some(time_idx)) = (column("Date"), column("Time")) else {
            return Err(SplError::sensor_parse(path, "missing Date or Time column"));
        };

        let Some(record) = reader.records().next().transpose()? else {
            return Err(SplError::sensor_parse(path, "no data rows"));
        };
        let date = record.get(date_idx).unwrap_or_default();
        let time = record.get(time_idx).unwrap_or_default();

        TimestampProcessor::parse_str(&format!("{date} {time}"))
            .ok_or_else(|| SplError::sensor_parse(path, format!("unreadable start \"{date} {time}\"")))
    }
}

// ── Byte helpers ──────────────────────────────────────────────────────────────

/// Read at most `limit` bytes from the start of `path`.
fn read_head(path: &Path, limit: u64) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|source| SplError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = Vec::new();
    file.take(limit)
        .read_to_end(&mut buf)
        .map_err(|source| SplError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(buf)
}

fn le_u16(buf: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(buf.get(offset..offset + 2)?.try_into().ok()?))
}

fn le_u32(buf: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(buf.get(offset..offset + 4)?.try_into().ok()?))
}

// ── Tests ─────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use tempfile::TempDir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 10, 17, 3, 15, 24).unwrap() + TimeDelta::milliseconds(420)
    }

    fn write(tmp: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = tmp.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    // ── parser_for ────────────────────────────────────────────────────────────

    #[test]
    fn test_parser_for_every_family() {
        for family in SensorFamily::ALL {
            assert_eq!(parser_for(family).family(), family);
        }
        assert_eq!(min_file_size(SensorFamily::Sss), Some(XTF_MIN_FILE_SIZE));
        assert_eq!(min_file_size(SensorFamily::Mbes), None);
    }

    // ── AllParser ─────────────────────────────────────────────────────────────

    #[test]
    fn test_all_first_datagram() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "0001_M100.all", &all_bytes(start()));
        assert_eq!(AllParser.parse(&path).unwrap(), start());
    }

    #[test]
    fn test_all_bad_stx() {
        let tmp = TempDir::new().unwrap();
        let mut bytes = all_bytes(start());
        bytes[4] = 0x7F;
        let path = write(&tmp, "bad.all", &bytes);
        assert!(matches!(AllParser.parse(&path), Err(SplError::SensorParse { .. })));
    }

    #[test]
    fn test_all_truncated() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "short.all", &[0x10, 0, 0]);
        assert!(AllParser.parse(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_file_read_error() {
        let tmp = TempDir::new().unwrap();
        let err = AllParser.parse(&tmp.path().join("gone.all")).unwrap_err();
        assert!(matches!(err, SplError::FileRead { .. }));
    }

    // ── XtfParser ─────────────────────────────────────────────────────────────

    #[test]
    fn test_xtf_skips_non_ping_packets() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "line.xtf", &xtf_bytes(start(), 2, 0));
        assert_eq!(XtfParser.parse(&path).unwrap(), start());
    }

    #[test]
    fn test_xtf_extended_channel_header() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "wide.xtf", &xtf_bytes(start(), 12, 0));
        assert_eq!(XtfParser.parse(&path).unwrap(), start());
    }

    #[test]
    fn test_xtf_header_len() {
        let mut buf = vec![0u8; 1024];
        assert_eq!(XtfParser::header_len(&buf), 1024);
        buf[166..168].copy_from_slice(&7u16.to_le_bytes());
        assert_eq!(XtfParser::header_len(&buf), 2048);
    }

    #[test]
    fn test_xtf_without_ping() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "empty.xtf", &vec![0u8; 4096]);
        let err = XtfParser.parse(&path).unwrap_err();
        assert!(err.to_string().contains("no ping packet"));
    }

    // ── SegyParser ────────────────────────────────────────────────────────────

    #[test]
    fn test_segy_big_endian() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "sbp.sgy", &segy_bytes(start(), true, 0));
        let expected = Utc.with_ymd_and_hms(2020, 10, 17, 3, 15, 24).unwrap();
        assert_eq!(SegyParser::new(SensorFamily::Sbp).parse(&path).unwrap(), expected);
    }

    #[test]
    fn test_segy_little_endian_with_extended_header() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "uhrs.segy", &segy_bytes(start(), false, 2));
        let expected = Utc.with_ymd_and_hms(2020, 10, 17, 3, 15, 24).unwrap();
        assert_eq!(SegyParser::new(SensorFamily::Suhrs).parse(&path).unwrap(), expected);
    }

    #[test]
    fn test_segy_zero_date_falls_back_to_epoch() {
        let tmp = TempDir::new().unwrap();
        let mut bytes = vec![b' '; 3200];
        bytes.extend(vec![0u8; 400 + 240]);
        bytes[3224..3226].copy_from_slice(&1i16.to_be_bytes());
        let path = write(&tmp, "zero.sgy", &bytes);
        assert_eq!(
            SegyParser::new(SensorFamily::Sbp).parse(&path).unwrap(),
            DateTime::<Utc>::default()
        );
    }

    #[test]
    fn test_segy_truncated() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "short.sgy", &vec![b' '; 3600]);
        assert!(SegyParser::new(SensorFamily::Sbp).parse(&path).is_err());
    }

    #[test]
    fn test_normalise_year() {
        assert_eq!(normalise_year(20), 2020);
        assert_eq!(normalise_year(98), 1998);
        assert_eq!(normalise_year(2021), 2021);
    }

    // ── MagCsvParser ──────────────────────────────────────────────────────────

    #[test]
    fn test_mag_first_row() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "mag.csv", mag_csv(start()).as_bytes());
        assert_eq!(MagCsvParser.parse(&path).unwrap(), start());
    }

    #[test]
    fn test_mag_columns_by_name() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "mag.csv",
            b"Line_Name,Time,Date\nM100,03:15:24,2020-10-17\n",
        );
        let expected = Utc.with_ymd_and_hms(2020, 10, 17, 3, 15, 24).unwrap();
        assert_eq!(MagCsvParser.parse(&path).unwrap(), expected);
    }

    #[test]
    fn test_mag_missing_time_column() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "mag.csv", b"Date,Value\n2020/10/17,1\n");
        let err = MagCsvParser.parse(&path).unwrap_err();
        assert!(err.to_string().contains("missing Date or Time column"));
    }

    #[test]
    fn test_mag_header_only() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "mag.csv", b"Date,Time\n");
        assert!(MagCsvParser.parse(&path).is_err());
    }
}
