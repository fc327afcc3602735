use uuid::Uuid;

use vansweep_common::Source;

/// Per-source tally from one run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: Source,
    pub succeeded: u32,
    pub failed: u32,
    pub cancelled: u32,
    pub records_fetched: u32,
    pub new_records: u32,
}

impl SourceReport {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            records_fetched: 0,
            new_records: 0,
        }
    }
}

/// Final run summary. Always produced, even when the run aborts early —
/// whatever was collected before the abort is reported, not lost.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn total_new_records(&self) -> u32 {
        self.sources.iter().map(|s| s.new_records).sum()
    }

    pub fn total_succeeded(&self) -> u32 {
        self.sources.iter().map(|s| s.succeeded).sum()
    }

    pub fn total_failed(&self) -> u32 {
        self.sources.iter().map(|s| s.failed).sum()
    }

    pub fn total_cancelled(&self) -> u32 {
        self.sources.iter().map(|s| s.cancelled).sum()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Sweep Run Complete ===")?;
        writeln!(f, "Run:            {}", self.run_id)?;
        for report in &self.sources {
            writeln!(
                f,
                "  {:<11} ok {:>3} / failed {:>3} / cancelled {:>3} / fetched {:>5} / new {:>5}",
                report.source.as_str(),
                report.succeeded,
                report.failed,
                report.cancelled,
                report.records_fetched,
                report.new_records,
            )?;
        }
        writeln!(f, "Invocations ok: {}", self.total_succeeded())?;
        writeln!(f, "Failed:         {}", self.total_failed())?;
        if self.total_cancelled() > 0 {
            writeln!(f, "Cancelled:      {}", self.total_cancelled())?;
        }
        write!(f, "New records:    {}", self.total_new_records())
    }
}
