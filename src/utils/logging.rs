//! Trace-level timing of solver passes.

use log::{log_enabled, trace, Level};
use std::time::Instant;

/// Traces how long one pass over the body tree took.
///
/// `pass` names the stage being realized or `"assembly"` for the Newton
/// projection of Q.
pub struct PassTimer {
    pass: &'static str,
    bodies: usize,
    start: Option<Instant>,
}

impl PassTimer {
    pub fn new(pass: &'static str, bodies: usize) -> Self {
        let start = log_enabled!(Level::Trace).then(Instant::now);
        Self {
            pass,
            bodies,
            start,
        }
    }
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            trace!(
                "{} over {} bodies took {} us",
                self.pass,
                self.bodies,
                start.elapsed().as_micros()
            );
        }
    }
}
