//! Trigger edge detection

/// Change between two consecutive trigger samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Falling,
}

/// Compares each sample against the previous one
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample; the previous sample is updated every call
    pub fn update(&mut self, level: bool) -> Edge {
        let edge = match (self.previous, level) {
            (false, true) => Edge::Rising,
            (true, false) => Edge::Falling,
            _ => Edge::None,
        };
        self.previous = level;
        edge
    }

    /// Last sample seen
    pub fn level(&self) -> bool {
        self.previous
    }
}
