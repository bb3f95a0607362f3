//! Response lifecycle tracking.

use std::time::{Duration, Instant};

/// Where a streamed response stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Nothing written yet.
    Start,
    /// Shell written, no fragment yet.
    ShellSent,
    /// The named fragment was the last one written.
    FragmentSent(String),
    /// Response closed.
    Completion,
}

/// Write timeline of one response.
///
/// Fragments are kept in write order together with the number of fragments
/// the engine still owed the client once each one was out, so a slow tail
/// shows up as a long run of small `remaining` counts.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    shell_sent: Option<Instant>,
    completed: Option<Instant>,
    fragments: Vec<FragmentTiming>,
}

impl TimingContext {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            shell_sent: None,
            completed: None,
            fragments: Vec::new(),
        }
    }

    pub fn mark_shell_sent(&mut self) {
        self.shell_sent.get_or_insert_with(Instant::now);
    }

    /// Record a fragment whose write began at `started`. `remaining` is the
    /// outstanding count after this fragment settled.
    pub fn mark_fragment_sent(&mut self, pagelet: &str, started: Instant, remaining: usize) {
        let sent = Instant::now();
        self.fragments.push(FragmentTiming {
            name: pagelet.to_string(),
            start: started.saturating_duration_since(self.start),
            sent: sent.saturating_duration_since(self.start),
            duration: sent.saturating_duration_since(started),
            remaining,
        });
    }

    pub fn mark_complete(&mut self) {
        self.completed.get_or_insert_with(Instant::now);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn time_to_shell(&self) -> Option<Duration> {
        self.shell_sent.map(|t| t.duration_since(self.start))
    }

    pub fn time_to_first_fragment(&self) -> Option<Duration> {
        self.fragments.first().map(|f| f.sent)
    }

    pub fn time_to_complete(&self) -> Option<Duration> {
        self.completed.map(|t| t.duration_since(self.start))
    }

    /// First write of the fragment named `pagelet`.
    pub fn fragment_timing(&self, pagelet: &str) -> Option<&FragmentTiming> {
        self.fragments.iter().find(|f| f.name == pagelet)
    }

    /// Every fragment in write order.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentTiming> {
        self.fragments.iter()
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing of a single fragment write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentTiming {
    pub name: String,
    /// From request start to write start.
    pub start: Duration,
    /// From request start to fragment sent.
    pub sent: Duration,
    pub duration: Duration,
    /// Fragments still outstanding after this one.
    pub remaining: usize,
}
