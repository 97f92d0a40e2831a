use tracing::debug;

use crate::aggregate::{aggregate, CourseCounts};
use crate::client::QuerySink;
use crate::error::DashboardError;
use crate::models::{AttendanceRecord, Delivery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Loaded,
    Empty,
    ValidationFailed,
    FetchFailed,
}

/// Screen state for one student search at a time.
#[derive(Debug)]
pub struct Dashboard {
    input: String,
    phase: Phase,
    records: Vec<AttendanceRecord>,
    shown_student: Option<String>,
    searching_for: Option<String>,
    error: Option<String>,
    active_seq: Option<u64>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            input: String::new(),
            phase: Phase::Idle,
            records: Vec::new(),
            shown_student: None,
            searching_for: None,
            error: None,
            active_seq: None,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: impl Into<String>) {
        self.input = value.into();
    }

    pub fn push_char(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// Student whose records are currently on screen.
    pub fn shown_student(&self) -> Option<&str> {
        self.shown_student.as_deref()
    }

    pub fn course_counts(&self) -> CourseCounts {
        aggregate(&self.records)
    }

    pub fn submit(&mut self, sink: &mut impl QuerySink) {
        let student_id = self.input.trim().to_string();
        if student_id.is_empty() {
            self.fail(Phase::ValidationFailed, DashboardError::Validation);
            return;
        }

        match sink.subscribe(&student_id) {
            Ok(seq) => {
                self.phase = Phase::Loading;
                self.error = None;
                self.active_seq = Some(seq);
                self.searching_for = Some(student_id);
            }
            Err(err @ DashboardError::Validation) => self.fail(Phase::ValidationFailed, err),
            Err(err) => self.fail(Phase::FetchFailed, err),
        }
    }

    /// Applies a delivery. Returns false, leaving state untouched, when the
    /// delivery belongs to a query that is no longer the active one.
    ///
    /// After a blank submit the live query keeps refreshing the records, but
    /// the validation banner stays until the next real search.
    pub fn apply(&mut self, delivery: Delivery) -> bool {
        if self.active_seq != Some(delivery.seq) {
            debug!(
                seq = delivery.seq,
                active = ?self.active_seq,
                "dropping stale delivery"
            );
            return false;
        }

        let held_error = (self.phase == Phase::ValidationFailed).then(|| self.error.take());

        match delivery.outcome {
            Ok(records) if records.is_empty() => {
                self.records.clear();
                self.shown_student = None;
                self.fail(Phase::Empty, DashboardError::EmptyResult);
            }
            Ok(records) => {
                self.records = records;
                self.shown_student = self.searching_for.clone();
                self.error = None;
                self.phase = Phase::Loaded;
            }
            Err(err) => self.fail(Phase::FetchFailed, err),
        }

        if let Some(error) = held_error {
            self.phase = Phase::ValidationFailed;
            self.error = error;
        }
        true
    }

    fn fail(&mut self, phase: Phase, err: DashboardError) {
        self.phase = phase;
        self.error = Some(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::client::testing::{wait_closed, FakeStore};
    use crate::client::QueryClient;
    use crate::models::sample_record;

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<String>,
    }

    impl QuerySink for RecordingSink {
        fn subscribe(&mut self, student_id: &str) -> Result<u64, DashboardError> {
            self.calls.push(student_id.to_string());
            Ok(self.calls.len() as u64)
        }
    }

    fn loaded(courses: &[&str]) -> Vec<AttendanceRecord> {
        courses
            .iter()
            .map(|course| sample_record(course, "2026-02-02 09:00:00"))
            .collect()
    }

    fn search(dashboard: &mut Dashboard, sink: &mut RecordingSink, id: &str) -> u64 {
        dashboard.set_input(id);
        dashboard.submit(sink);
        sink.calls.len() as u64
    }

    #[test]
    fn starts_idle() {
        let dashboard = Dashboard::new();
        assert_eq!(dashboard.phase(), Phase::Idle);
        assert!(dashboard.error().is_none());
        assert!(dashboard.records().is_empty());
    }

    #[test]
    fn blank_submit_fails_validation_without_querying() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();

        for input in ["", "   ", "\t\n"] {
            dashboard.set_input(input);
            dashboard.submit(&mut sink);
            assert_eq!(dashboard.phase(), Phase::ValidationFailed);
            assert_eq!(dashboard.error(), Some("Please enter a Student ID"));
            assert!(!dashboard.is_loading());
        }
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn submit_enters_loading_and_clears_error() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();
        dashboard.submit(&mut sink);
        assert!(dashboard.error().is_some());

        search(&mut dashboard, &mut sink, "  S123 ");
        assert_eq!(dashboard.phase(), Phase::Loading);
        assert!(dashboard.error().is_none());
        assert_eq!(sink.calls, vec!["S123".to_string()]);
    }

    #[test]
    fn records_load_into_the_chart() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();
        let seq = search(&mut dashboard, &mut sink, "S123");

        assert!(dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Math", "Physics", "Math", "Physics"])),
        }));

        assert_eq!(dashboard.phase(), Phase::Loaded);
        assert_eq!(dashboard.shown_student(), Some("S123"));
        let counts = dashboard.course_counts();
        assert_eq!(counts.get("Math"), Some(2));
        assert_eq!(counts.get("Physics"), Some(2));
        assert_eq!(counts.title(), "Total Courses: 2");
    }

    #[test]
    fn empty_result_clears_records() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();
        let seq = search(&mut dashboard, &mut sink, "S123");
        dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Math"])),
        });

        let seq = search(&mut dashboard, &mut sink, "S999");
        dashboard.apply(Delivery {
            seq,
            outcome: Ok(Vec::new()),
        });

        assert_eq!(dashboard.phase(), Phase::Empty);
        assert_eq!(dashboard.error(), Some("No records found for this student ID"));
        assert!(dashboard.records().is_empty());
        assert!(!dashboard.is_loading());
    }

    #[test]
    fn fetch_failure_keeps_the_previous_chart() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();
        let seq = search(&mut dashboard, &mut sink, "S123");
        dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Math", "Art"])),
        });

        let seq = search(&mut dashboard, &mut sink, "S456");
        dashboard.apply(Delivery {
            seq,
            outcome: Err(DashboardError::fetch("bad record")),
        });

        assert_eq!(dashboard.phase(), Phase::FetchFailed);
        assert_eq!(dashboard.error(), Some("Error fetching student data"));
        assert_eq!(dashboard.records().len(), 2);
        assert_eq!(dashboard.shown_student(), Some("S123"));
    }

    #[test]
    fn stale_delivery_is_ignored() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();
        let old = search(&mut dashboard, &mut sink, "S123");
        let current = search(&mut dashboard, &mut sink, "S456");

        assert!(!dashboard.apply(Delivery {
            seq: old,
            outcome: Ok(loaded(&["Math"])),
        }));
        assert_eq!(dashboard.phase(), Phase::Loading);
        assert!(dashboard.records().is_empty());

        assert!(dashboard.apply(Delivery {
            seq: current,
            outcome: Ok(loaded(&["Art"])),
        }));
        assert_eq!(dashboard.shown_student(), Some("S456"));
    }

    #[test]
    fn blank_submit_banner_survives_live_updates() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();
        let seq = search(&mut dashboard, &mut sink, "S123");
        dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Math"])),
        });

        dashboard.set_input("  ");
        dashboard.submit(&mut sink);
        assert_eq!(dashboard.phase(), Phase::ValidationFailed);

        assert!(dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Math", "Art"])),
        }));
        assert_eq!(dashboard.phase(), Phase::ValidationFailed);
        assert_eq!(dashboard.error(), Some("Please enter a Student ID"));
        assert_eq!(dashboard.records().len(), 2);

        dashboard.apply(Delivery {
            seq,
            outcome: Err(DashboardError::fetch("stream dropped")),
        });
        assert_eq!(dashboard.phase(), Phase::ValidationFailed);
        assert_eq!(dashboard.error(), Some("Please enter a Student ID"));

        let seq = search(&mut dashboard, &mut sink, "S456");
        dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Bio"])),
        });
        assert_eq!(dashboard.phase(), Phase::Loaded);
        assert!(dashboard.error().is_none());
    }

    #[test]
    fn live_updates_for_the_active_query_keep_applying() {
        let mut dashboard = Dashboard::new();
        let mut sink = RecordingSink::default();
        let seq = search(&mut dashboard, &mut sink, "S123");

        dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Math"])),
        });
        dashboard.apply(Delivery {
            seq,
            outcome: Ok(loaded(&["Math", "Art"])),
        });
        assert_eq!(dashboard.course_counts().len(), 2);
    }

    #[tokio::test]
    async fn rapid_double_submit_leaves_one_live_subscription() {
        let store = Arc::new(FakeStore::default());
        let (tx, mut rx) = unbounded_channel();
        let mut client = QueryClient::new(store.clone(), tx);
        let mut dashboard = Dashboard::new();

        dashboard.set_input("S123");
        dashboard.submit(&mut client);
        dashboard.submit(&mut client);

        assert_eq!(store.queries().len(), 2);
        assert!(wait_closed(&store.feed(0)).await);
        assert!(!store.feed(1).is_closed());

        let record = json!({
            "name": "Avery Lee",
            "SID": "S123",
            "course": "Math",
            "section": "A",
            "timings": "Mon 09:00",
            "timestamp": "2026-02-02 09:00:00"
        });
        store
            .feed(1)
            .unbounded_send(Ok(json!({ "-N0": record })))
            .unwrap();

        let delivery = rx.recv().await.unwrap();
        assert_eq!(Some(delivery.seq), client.active_seq());
        assert!(dashboard.apply(delivery));
        assert_eq!(dashboard.phase(), Phase::Loaded);
        assert!(rx.try_recv().is_err());
    }
}
