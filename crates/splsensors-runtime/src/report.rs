//! CSV exports and the consolidated multi-sheet report.
//!
//! Sheets are plain header + rows tables assembled from the analysis results
//! and handed to a [`ReportWriter`]. [`XlsxWriter`] puts every sheet in one
//! `_<vessel>_FINAL_Log.xlsx` workbook; [`CsvDirectoryWriter`] lays them out
//! as CSV files inside `_<vessel>_FINAL_Log/`.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use splsensors_core::error::{Result, SplError};
use splsensors_core::formatting::{format_duration, format_timestamp, markdown_table};
use splsensors_core::models::{SensorFamily, Session};
use splsensors_data::aggregator::{flat_rows, FlatRow, SessionWideRow, SessionWideView, FULL_LOG_COLUMNS};
use splsensors_data::analysis::{FamilyAnalysis, SummaryRow};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tracing::debug;

/// Columns of the process summary, shared by the sheet and the console table.
pub const SUMMARY_COLUMNS: [&str; 7] = [
    "Sensor",
    "Processed Files",
    "Duplicated Files",
    "Wrong Timestamp (SBP)",
    "Renamed Files",
    "Moved Files",
    "Duration",
];

const SENSOR_TYPE: &str = "Sensor Type";

/// Widest auto-fitted worksheet column, in characters.
const MAX_COLUMN_WIDTH: usize = 80;

// ── Sheets ────────────────────────────────────────────────────────────────────

/// One named table of the consolidated report.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            name: name.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// Destination for report sheets.
pub trait ReportWriter {
    fn write_sheet(&mut self, sheet: &Sheet) -> Result<()>;

    /// Finalise the report and return where it was written.
    fn finish(self: Box<Self>) -> Result<PathBuf>;
}

/// Writes every sheet as `<dir>/<sheet name>.csv`.
pub struct CsvDirectoryWriter {
    dir: PathBuf,
    written: usize,
}

impl CsvDirectoryWriter {
    /// Create `<output>/_<vessel>_FINAL_Log/`.
    pub fn create(output: &Path, vessel: &str) -> Result<Self> {
        let dir = report_dir(output, vessel);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }
}

impl ReportWriter for CsvDirectoryWriter {
    fn write_sheet(&mut self, sheet: &Sheet) -> Result<()> {
        let path = self.dir.join(format!("{}.csv", sheet.name));
        write_csv(&path, &sheet.headers, &sheet.rows)?;
        self.written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        debug!("{} report sheets written to {}", self.written, self.dir.display());
        Ok(self.dir)
    }
}

pub fn report_dir(output: &Path, vessel: &str) -> PathBuf {
    output.join(format!("_{vessel}_FINAL_Log"))
}

/// Writes every sheet as one worksheet of `<output>/_<vessel>_FINAL_Log.xlsx`.
///
/// The header row is bold and frozen. Cells spanning several lines (the
/// session-wide file lists) are wrapped, and columns are sized to their
/// longest line.
pub struct XlsxWriter {
    path: PathBuf,
    workbook: Workbook,
    header: Format,
    wrap: Format,
    written: usize,
}

impl XlsxWriter {
    pub fn create(output: &Path, vessel: &str) -> Self {
        Self {
            path: report_workbook_path(output, vessel),
            workbook: Workbook::new(),
            header: Format::new().set_bold(),
            wrap: Format::new().set_text_wrap(),
            written: 0,
        }
    }
}

impl ReportWriter for XlsxWriter {
    fn write_sheet(&mut self, sheet: &Sheet) -> Result<()> {
        let worksheet = self.workbook.add_worksheet();
        fill_worksheet(worksheet, sheet, &self.header, &self.wrap).map_err(|e| report_error(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        let XlsxWriter {
            path,
            mut workbook,
            written,
            ..
        } = *self;
        workbook.save(&path).map_err(|e| report_error(&path, e))?;
        debug!("{} report sheets written to {}", written, path.display());
        Ok(path)
    }
}

fn fill_worksheet(
    worksheet: &mut Worksheet,
    sheet: &Sheet,
    header: &Format,
    wrap: &Format,
) -> std::result::Result<(), XlsxError> {
    worksheet.set_name(sheet.name.as_str())?;

    let mut widths: Vec<usize> = sheet.headers.iter().map(|h| h.chars().count()).collect();
    for (col, title) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, title.as_str(), header)?;
    }

    for (index, row) in sheet.rows.iter().enumerate() {
        let row_num = index as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            if col >= widths.len() {
                widths.resize(col + 1, 0);
            }
            if cell.is_empty() {
                continue;
            }
            if cell.contains('\n') {
                worksheet.write_string_with_format(row_num, col as u16, cell.as_str(), wrap)?;
            } else {
                worksheet.write_string(row_num, col as u16, cell.as_str())?;
            }
            let longest = cell.lines().map(|l| l.chars().count()).max().unwrap_or(0);
            widths[col] = widths[col].max(longest);
        }
    }

    for (col, width) in widths.into_iter().enumerate() {
        worksheet.set_column_width(col as u16, (width + 2).min(MAX_COLUMN_WIDTH) as f64)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn report_error(path: &Path, err: XlsxError) -> SplError {
    SplError::Report {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

pub fn report_workbook_path(output: &Path, vessel: &str) -> PathBuf {
    output.join(format!("_{vessel}_FINAL_Log.xlsx"))
}

// ── Per-family exports ────────────────────────────────────────────────────────

/// `<output>/<vessel>_<FAMILY>_Full_Log.csv`.
pub fn full_log_path(output: &Path, vessel: &str, family: SensorFamily) -> PathBuf {
    output.join(format!("{vessel}_{family}_Full_Log.csv"))
}

/// Write the flat table of one family; the file doubles as a replay inventory.
pub fn write_full_log(path: &Path, rows: &[FlatRow]) -> Result<()> {
    let records: Vec<Vec<String>> = rows.iter().map(FlatRow::to_record).collect();
    write_csv(path, &FULL_LOG_COLUMNS, &records)
}

fn write_csv<H: AsRef<str>>(path: &Path, headers: &[H], rows: &[Vec<String>]) -> Result<()> {
    let file = File::create(path).map_err(|source| SplError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    let headers: Vec<&str> = headers.iter().map(AsRef::<str>::as_ref).collect();
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    writer.write_record(&headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ── Sheet assembly ────────────────────────────────────────────────────────────

/// Inputs of the consolidated report.
pub struct ReportInput<'a> {
    pub vessel: &'a str,
    pub sessions: &'a [Session],
    pub families: &'a [FamilyAnalysis],
    pub summary: &'a [SummaryRow],
    pub session_wide: &'a SessionWideView,
}

/// Every sheet of the consolidated report, in workbook order.
pub fn build_sheets(input: &ReportInput<'_>) -> Vec<Sheet> {
    let mut sheets = vec![
        summary_sheet(input.summary),
        full_list_sheet(input.families),
        session_wide_sheet("Session_Wide_List", input.session_wide.rows.iter()),
        missing_spl_sheet(input.families),
    ];
    for family in SensorFamily::ALL {
        sheets.push(session_wide_sheet(
            &format!("{family}_NotMatching"),
            input.session_wide.not_matching(family).into_iter(),
        ));
    }
    sheets.push(duplicated_spl_sheet(input));
    sheets.push(duplicated_sensor_sheet(input));
    sheets.push(spl_problem_sheet(input.sessions));
    sheets.push(skipped_sheet(input.families));
    sheets.push(wrong_timestamp_sheet(input.families));
    sheets.push(parse_failure_sheet(input.families));
    sheets
}

fn summary_record(row: &SummaryRow) -> Vec<String> {
    vec![
        row.family.to_string(),
        row.processed.to_string(),
        row.duplicated.to_string(),
        row.wrong_timestamp.map(|n| n.to_string()).unwrap_or_default(),
        row.renamed.to_string(),
        row.moved.map(|n| n.to_string()).unwrap_or_default(),
        format_duration(row.duration),
    ]
}

fn summary_sheet(summary: &[SummaryRow]) -> Sheet {
    let mut sheet = Sheet::new("Summary_Process_Log", &SUMMARY_COLUMNS);
    sheet.rows = summary.iter().map(summary_record).collect();
    sheet
}

/// GitHub-flavoured markdown rendering of the process summary.
pub fn summary_table(summary: &[SummaryRow]) -> String {
    let rows: Vec<Vec<String>> = summary.iter().map(summary_record).collect();
    markdown_table(&SUMMARY_COLUMNS, &rows)
}

fn typed_full_log_headers() -> Vec<&'static str> {
    std::iter::once(SENSOR_TYPE).chain(FULL_LOG_COLUMNS).collect()
}

fn typed_record(row: &FlatRow) -> Vec<String> {
    std::iter::once(row.family.to_string()).chain(row.to_record()).collect()
}

fn full_list_sheet(families: &[FamilyAnalysis]) -> Sheet {
    let mut sheet = Sheet::new("Full_List", &typed_full_log_headers());
    for analysis in families {
        sheet.rows.extend(analysis.flat.iter().map(typed_record));
    }
    sheet
}

fn missing_spl_sheet(families: &[FamilyAnalysis]) -> Sheet {
    let mut sheet = Sheet::new("Missing_SPL", &[SENSOR_TYPE, "Sensor Start", "FilePath", "Sensor FileName"]);
    for row in families.iter().flat_map(|a| &a.flat).filter(|r| r.session.is_none()) {
        sheet.push(vec![
            row.family.to_string(),
            format_timestamp(Some(row.sensor_start)),
            row.file_path.display().to_string(),
            row.file_name.clone(),
        ]);
    }
    sheet
}

fn session_wide_headers() -> Vec<&'static str> {
    let mut headers = vec!["Session Start", "Session End", "Vessel Name", "SPL LineName"];
    headers.extend(SensorFamily::ALL.iter().map(|f| f.as_str()));
    headers
}

fn session_wide_record(row: &SessionWideRow) -> Vec<String> {
    let mut record = vec![
        format_timestamp(row.start),
        format_timestamp(row.end),
        row.vessel.clone(),
        row.line.to_string(),
    ];
    record.extend(SensorFamily::ALL.iter().map(|f| row.cell(*f).unwrap_or_default()));
    record
}

fn session_wide_sheet<'r>(name: &str, rows: impl Iterator<Item = &'r SessionWideRow>) -> Sheet {
    let mut sheet = Sheet::new(name, &session_wide_headers());
    sheet.rows = rows.map(session_wide_record).collect();
    sheet
}

fn duplicated_spl_sheet(input: &ReportInput<'_>) -> Sheet {
    let mut headers = session_wide_headers();
    headers.push("Issue");
    let mut sheet = Sheet::new("Duplicated_SPL_Name", &headers);

    for row in input.session_wide.duplicated_line_names() {
        let mut record = session_wide_record(row);
        record.push("duplicated line name".to_string());
        sheet.push(record);
    }

    for collision in &input.session_wide.collisions {
        let Some(session) = input.sessions.iter().find(|s| s.id == collision.session) else {
            continue;
        };
        let mut record = vec![
            format_timestamp(session.start),
            format_timestamp(session.end),
            input.vessel.to_string(),
            session.line.to_string(),
        ];
        record.extend(SensorFamily::ALL.iter().map(|_| String::new()));
        record.push(format!("start collision ({})", session.source.display()));
        sheet.push(record);
    }
    sheet
}

fn duplicated_sensor_sheet(input: &ReportInput<'_>) -> Sheet {
    let mut sheet = Sheet::new("Duplicated_Sensor_Data", &typed_full_log_headers());
    for analysis in input.families {
        let rows = flat_rows(analysis.family, &analysis.matches.duplicates, input.sessions, input.vessel);
        sheet.rows.extend(rows.iter().map(typed_record));
    }
    sheet
}

fn spl_problem_sheet(sessions: &[Session]) -> Sheet {
    let mut sheet = Sheet::new(
        "SPL_Problem",
        &["Session File", "Session Start", "Session End", "SPL LineName"],
    );
    for session in sessions.iter().filter(|s| s.is_problem()) {
        sheet.push(vec![
            session.source.display().to_string(),
            format_timestamp(session.start),
            format_timestamp(session.end),
            session.line.to_string(),
        ]);
    }
    sheet
}

fn skipped_sheet(families: &[FamilyAnalysis]) -> Sheet {
    let mut sheet = Sheet::new("Skip_SSS_Files", &[SENSOR_TYPE, "FilePath", "Size [MB]"]);
    for analysis in families {
        for skipped in &analysis.skipped {
            sheet.push(vec![
                analysis.family.to_string(),
                skipped.path.display().to_string(),
                format!("{:.3}", skipped.size_mb),
            ]);
        }
    }
    sheet
}

fn wrong_timestamp_sheet(families: &[FamilyAnalysis]) -> Sheet {
    let mut sheet = Sheet::new("Wrong_Timestamp", &[SENSOR_TYPE, "Sensor Start", "FilePath", "Sensor FileName"]);
    for obs in families.iter().flat_map(|a| &a.wrong_timestamps) {
        sheet.push(vec![
            obs.family.to_string(),
            format_timestamp(Some(obs.timestamp)),
            obs.file_path.display().to_string(),
            obs.display_name.clone(),
        ]);
    }
    sheet
}

fn parse_failure_sheet(families: &[FamilyAnalysis]) -> Sheet {
    let mut sheet = Sheet::new("Parse_Failures", &[SENSOR_TYPE, "FilePath", "Reason"]);
    for failure in families.iter().flat_map(|a| &a.failures) {
        sheet.push(vec![
            failure.family.to_string(),
            failure.path.display().to_string(),
            failure.reason.clone(),
        ]);
    }
    sheet
}

/// Build and write every sheet, returning the report location.
pub fn write_report(mut writer: Box<dyn ReportWriter>, input: &ReportInput<'_>) -> Result<PathBuf> {
    for sheet in build_sheets(input) {
        writer.write_sheet(&sheet)?;
    }
    writer.finish()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use splsensors_core::models::{SensorObservation, SessionId, SessionLine};
    use splsensors_data::aggregator::build_session_wide;
    use splsensors_data::analysis::analyze_family;
    use splsensors_data::locator::{ParseFailure, ScanOutcome, SkippedFile};
    use std::time::Duration;
    use tempfile::TempDir;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 10, 17, h, m, 0).unwrap()
    }

    fn session(id: usize, start: Option<DateTime<Utc>>, minutes: i64, line: SessionLine) -> Session {
        Session {
            id: SessionId(id),
            source: PathBuf::from(format!("/nav/{id}/V-Position.fbf")),
            start,
            end: start.map(|s| s + TimeDelta::minutes(minutes)),
            line,
            max_gap: Some(1.0),
            session_name: None,
        }
    }

    fn fixture() -> (Vec<Session>, Vec<FamilyAnalysis>) {
        let sessions = vec![
            session(0, Some(ts(10, 0)), 30, SessionLine::Named("M100".to_string())),
            // Same start as session 0 but covers nothing past it.
            session(1, Some(ts(10, 0)), 0, SessionLine::Named("M101".to_string())),
            session(2, Some(ts(11, 0)), 30, SessionLine::Named("M100".to_string())),
            session(3, None, 0, SessionLine::Empty),
        ];
        let mbes = ScanOutcome {
            family: SensorFamily::Mbes,
            discovered: 3,
            observations: vec![
                SensorObservation::new(SensorFamily::Mbes, "/d/M100_a.all", ts(10, 5)),
                SensorObservation::new(SensorFamily::Mbes, "/d/M100_b.all", ts(10, 5)),
                SensorObservation::new(SensorFamily::Mbes, "/d/lost.all", ts(15, 0)),
            ],
            skipped: Vec::new(),
            failures: Vec::new(),
        };
        let sss = ScanOutcome {
            family: SensorFamily::Sss,
            discovered: 3,
            observations: vec![SensorObservation::new(SensorFamily::Sss, "/s/x.xtf", ts(11, 5))],
            skipped: vec![SkippedFile {
                path: PathBuf::from("/s/tiny.xtf"),
                size_mb: 0.25,
            }],
            failures: vec![ParseFailure {
                family: SensorFamily::Sss,
                path: PathBuf::from("/s/broken.xtf"),
                reason: "no ping packet".to_string(),
            }],
        };
        let families = vec![
            analyze_family(mbes, &sessions, "V", TimeDelta::zero()),
            analyze_family(sss, &sessions, "V", TimeDelta::zero()),
        ];
        (sessions, families)
    }

    fn sheet<'s>(sheets: &'s [Sheet], name: &str) -> &'s Sheet {
        sheets.iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_full_log_round_trips_as_inventory() {
        let tmp = TempDir::new().unwrap();
        let (_, families) = fixture();
        let path = full_log_path(tmp.path(), "V", SensorFamily::Mbes);
        assert!(path.ends_with("V_MBES_Full_Log.csv"));

        write_full_log(&path, &families[0].flat).unwrap();
        let replay = splsensors_data::locator::load_inventory(&path, SensorFamily::Mbes).unwrap();
        assert_eq!(replay.observations.len(), families[0].flat.len());
        assert_eq!(replay.observations[0].timestamp, ts(10, 5));
        assert!(replay.failures.is_empty());
    }

    #[test]
    fn test_build_sheets_names_and_contents() {
        let (sessions, families) = fixture();
        let outcomes: Vec<_> = families.iter().map(|a| a.matches.clone()).collect();
        let view = build_session_wide(&sessions, "V", &outcomes);
        let summary: Vec<_> = families.iter().map(|a| a.summary(0, None, Duration::ZERO)).collect();
        let input = ReportInput {
            vessel: "V",
            sessions: &sessions,
            families: &families,
            summary: &summary,
            session_wide: &view,
        };
        let sheets = build_sheets(&input);

        let names: Vec<_> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), 15);
        assert_eq!(names[0], "Summary_Process_Log");
        assert!(names.contains(&"SUHRS_NotMatching"));
        assert_eq!(names[14], "Parse_Failures");

        assert_eq!(sheet(&sheets, "Full_List").rows.len(), 3);
        assert_eq!(sheet(&sheets, "Missing_SPL").rows.len(), 1);
        assert_eq!(sheet(&sheets, "Duplicated_Sensor_Data").rows.len(), 2);
        assert_eq!(sheet(&sheets, "SPL_Problem").rows.len(), 1);
        assert_eq!(sheet(&sheets, "Skip_SSS_Files").rows[0][2], "0.250");
        assert_eq!(sheet(&sheets, "Parse_Failures").rows[0][2], "no ping packet");

        let dup_spl = sheet(&sheets, "Duplicated_SPL_Name");
        let issues: Vec<_> = dup_spl.rows.iter().map(|r| r.last().unwrap().as_str()).collect();
        assert_eq!(issues.iter().filter(|i| **i == "duplicated line name").count(), 2);
        assert!(issues.iter().any(|i| i.starts_with("start collision")));

        let summary = sheet(&sheets, "Summary_Process_Log");
        assert_eq!(summary.rows[0][..3], ["MBES", "3", "1"]);
        assert_eq!(summary.rows[1][1], "3");
    }

    #[test]
    fn test_csv_directory_writer() {
        let tmp = TempDir::new().unwrap();
        let mut sheet = Sheet::new("Missing_SPL", &["A", "B"]);
        sheet.push(vec!["1".to_string(), "two\nlines".to_string()]);

        let mut writer: Box<dyn ReportWriter> = Box::new(CsvDirectoryWriter::create(tmp.path(), "V").unwrap());
        writer.write_sheet(&sheet).unwrap();
        let dir = writer.finish().unwrap();

        assert_eq!(dir, tmp.path().join("_V_FINAL_Log"));
        let text = std::fs::read_to_string(dir.join("Missing_SPL.csv")).unwrap();
        assert!(text.starts_with("A,B\n"));
        assert!(text.contains("\"two\nlines\""));
    }

    #[test]
    fn test_full_log_into_missing_folder_is_write_error() {
        let tmp = TempDir::new().unwrap();
        let (_, families) = fixture();
        let path = full_log_path(&tmp.path().join("absent"), "V", SensorFamily::Mbes);

        match write_full_log(&path, &families[0].flat) {
            Err(SplError::FileWrite { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_xlsx_writer_saves_one_workbook() {
        let tmp = TempDir::new().unwrap();
        let mut wide = Sheet::new("Session_Wide_List", &["Session Start", "MBES"]);
        wide.push(vec!["2020-10-17 10:00:00".to_string(), "a [OK]\nb [OK]".to_string()]);
        wide.push(vec![String::new(), String::new()]);
        let summary = Sheet::new("Summary_Process_Log", &SUMMARY_COLUMNS);

        let mut writer: Box<dyn ReportWriter> = Box::new(XlsxWriter::create(tmp.path(), "V"));
        writer.write_sheet(&summary).unwrap();
        writer.write_sheet(&wide).unwrap();
        let path = writer.finish().unwrap();

        assert_eq!(path, tmp.path().join("_V_FINAL_Log.xlsx"));
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"), "xlsx is a zip container");
        assert!(!report_dir(tmp.path(), "V").exists());
    }

    #[test]
    fn test_xlsx_writer_rejects_invalid_sheet_name() {
        let tmp = TempDir::new().unwrap();
        let mut writer = XlsxWriter::create(tmp.path(), "V");
        let err = writer.write_sheet(&Sheet::new("Bad/Name", &["A"])).unwrap_err();
        assert!(matches!(err, SplError::Report { .. }));
    }

    #[test]
    fn test_xlsx_report_from_analysis() {
        let tmp = TempDir::new().unwrap();
        let (sessions, families) = fixture();
        let outcomes: Vec<_> = families.iter().map(|a| a.matches.clone()).collect();
        let view = build_session_wide(&sessions, "V", &outcomes);
        let input = ReportInput {
            vessel: "V",
            sessions: &sessions,
            families: &families,
            summary: &[],
            session_wide: &view,
        };
        let path = write_report(Box::new(XlsxWriter::create(tmp.path(), "V")), &input).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_summary_table_markdown() {
        let rows = vec![SummaryRow {
            family: SensorFamily::Sbp,
            processed: 4,
            duplicated: 0,
            wrong_timestamp: Some(1),
            renamed: 0,
            moved: None,
            duration: Duration::from_millis(1_500),
        }];
        let table = summary_table(&rows);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Wrong Timestamp (SBP)"));
        assert!(lines[2].contains("SBP"));
        assert!(lines[2].contains("0:00:01.500"));
    }
}
