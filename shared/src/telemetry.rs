use std::time::Instant;

/// Wall-clock timer feeding `elapsed_ms` log fields.
pub struct Telemetry {
    start: Instant,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
