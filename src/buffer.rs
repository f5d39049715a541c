use std::collections::VecDeque;

/// Number of most recent samples kept for live display
pub const DISPLAY_WINDOW: usize = 10;

/// Samples accepted during one session.
///
/// `samples` is the authoritative, append-only sequence that gets exported.
/// `recent` is a separate last-`DISPLAY_WINDOW` view; evicting from it never
/// touches `samples`.
#[derive(Debug)]
pub struct SampleBuffer<S> {
    samples: Vec<S>,
    recent: VecDeque<S>,
}

impl<S: Clone> SampleBuffer<S> {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            recent: VecDeque::with_capacity(DISPLAY_WINDOW + 1),
        }
    }

    pub fn push(&mut self, sample: S) {
        self.recent.push_back(sample.clone());
        if self.recent.len() > DISPLAY_WINDOW {
            self.recent.pop_front();
        }
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    /// Display window, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &S> {
        self.recent.iter()
    }

    /// Moves the full sequence out, leaving an empty buffer behind
    pub fn take(&mut self) -> Vec<S> {
        self.recent.clear();
        std::mem::take(&mut self.samples)
    }
}

impl<S: Clone> Default for SampleBuffer<S> {
    fn default() -> Self {
        Self::new()
    }
}
