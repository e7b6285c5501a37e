use crate::metric::RawRecord;
use crate::source::{Collector, ScrapeError};

/// Null collector
///
/// Stands in when no collector is configured. It never produces a record,
/// the rest of the pipeline runs idle.
#[derive(Debug, Default)]
pub struct Null {
    warned: bool,
}

impl Null {
    /// Create a new Null collector
    pub fn new() -> Null {
        Null::default()
    }
}

impl Collector for Null {
    fn name(&self) -> &str {
        "null"
    }

    fn scrape(&mut self) -> Result<RawRecord, ScrapeError> {
        if !self.warned {
            warn!("null collector configured; no measurements will be produced");
            self.warned = true;
        }
        Err(ScrapeError::NoData)
    }
}
