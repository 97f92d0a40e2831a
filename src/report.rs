use std::fmt::Write;
use std::path::Path;

use crate::aggregate::{aggregate, recent_visits, CourseCounts};
use crate::models::AttendanceRecord;

pub fn build_report(student_id: &str, records: &[AttendanceRecord]) -> String {
    let counts = aggregate(records);
    let mut output = String::new();

    let _ = writeln!(output, "# Student Attendance Report");
    let student_name = records
        .first()
        .map(|record| record.name.as_str())
        .unwrap_or("unknown student");
    let _ = writeln!(
        output,
        "Generated for {} ({}) across {} recorded visits",
        student_name,
        student_id,
        records.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Distribution");

    if counts.is_empty() {
        let _ = writeln!(output, "No records found for this student ID");
    } else {
        let _ = writeln!(output, "{}", counts.title());
        for slice in counts.slices() {
            let _ = writeln!(
                output,
                "- {}: {} visits ({:.1}%)",
                slice.course,
                slice.count,
                slice.share * 100.0
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Visits");

    let recent = recent_visits(records, 5);
    if recent.is_empty() {
        let _ = writeln!(output, "No visits recorded.");
    } else {
        for record in recent.iter() {
            let _ = writeln!(
                output,
                "- {} (section {}, {}) at {}",
                record.course, record.section, record.timings, record.timestamp
            );
        }
    }

    output
}

pub fn write_csv(path: &Path, counts: &CourseCounts) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct CsvRow<'a> {
        course: &'a str,
        visits: usize,
        share: String,
        color: String,
    }

    let mut writer = csv::Writer::from_path(path)?;
    for slice in counts.slices() {
        writer.serialize(CsvRow {
            course: &slice.course,
            visits: slice.count,
            share: format!("{:.4}", slice.share),
            color: slice.color.hex(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
