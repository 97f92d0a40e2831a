use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DashboardError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    #[serde(rename = "SID")]
    pub student_id: String,
    pub course: String,
    pub section: String,
    pub timings: String,
    pub timestamp: String,
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y, %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
];

impl AttendanceRecord {
    /// Best-effort parse of the free-form `timestamp` field.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.trim();

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }

        for format in NAIVE_FORMATS {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(parsed.and_utc());
            }
        }

        raw.parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

/// One result pushed by a subscription, tagged with the query it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub seq: u64,
    pub outcome: Result<Vec<AttendanceRecord>, DashboardError>,
}

#[cfg(test)]
pub(crate) fn sample_record(course: &str, timestamp: &str) -> AttendanceRecord {
    AttendanceRecord {
        name: "Avery Lee".to_string(),
        student_id: "S123".to_string(),
        course: course.to_string(),
        section: "A".to_string(),
        timings: "Mon 09:00-10:30".to_string(),
        timestamp: timestamp.to_string(),
    }
}
