//! Line-oriented console shared by all simulated threads.

use amt_kernel::ThreadId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub thread: ThreadId,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Console {
    lines: Vec<Line>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, thread: ThreadId, text: String) {
        log::info!(target: "amt::console", "{thread}: {text}");
        self.lines.push(Line { thread, text });
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Every line written so far, without the writer.
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|line| line.text.as_str()).collect()
    }

    /// Lines written by `thread`.
    pub fn from_thread(&self, thread: ThreadId) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|line| line.thread == thread)
            .map(|line| line.text.as_str())
            .collect()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.lines.iter().any(|line| line.text == text)
    }
}
