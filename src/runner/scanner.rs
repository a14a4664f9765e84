//! Incremental scanner for the extraction tool's stdout.
//!
//! Output arrives in arbitrary chunks. The scanner splits it into lines,
//! recognises the confirmation prompt (also on a line that has not been
//! terminated yet, since interactive prompts usually wait without a
//! newline) and the progress marker.

#[derive(Debug, Clone)]
pub struct Markers {
    pub confirm_prompt: String,
    pub progress_marker: String,
}

impl Markers {
    pub fn new<S: Into<String>>(confirm_prompt: S, progress_marker: S) -> Self {
        Self {
            confirm_prompt: confirm_prompt.into(),
            progress_marker: progress_marker.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Line(String),
    Confirm,
    Progress(u8),
}

#[derive(Debug)]
pub struct OutputScanner {
    markers: Markers,
    pending: Vec<u8>,
    pending_confirmed: bool,
}

impl OutputScanner {
    pub fn new(markers: Markers) -> Self {
        Self {
            markers,
            pending: Vec::new(),
            pending_confirmed: false,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        self.pending.extend_from_slice(chunk);

        // `\r` counts as a terminator so carriage-return progress updates are seen
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            let already_confirmed = std::mem::replace(&mut self.pending_confirmed, false);
            self.scan_line(line, already_confirmed, &mut events);
        }

        if !self.pending_confirmed
            && !self.pending.is_empty()
            && String::from_utf8_lossy(&self.pending).contains(&self.markers.confirm_prompt)
        {
            self.pending_confirmed = true;
            events.push(ScanEvent::Confirm);
        }

        events
    }

    /// Flush whatever is left once the stream hits EOF.
    pub fn finish(&mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw).into_owned();
            let already_confirmed = std::mem::replace(&mut self.pending_confirmed, false);
            self.scan_line(line, already_confirmed, &mut events);
        }
        events
    }

    fn scan_line(&self, line: String, already_confirmed: bool, events: &mut Vec<ScanEvent>) {
        if line.trim().is_empty() {
            return;
        }

        let confirm = !already_confirmed && line.contains(&self.markers.confirm_prompt);
        let progress = if line.contains(&self.markers.progress_marker) {
            let parsed = parse_progress(&line);
            if parsed.is_none() {
                tracing::debug!(line = %line, "progress line without a leading percentage");
            }
            parsed
        } else {
            None
        };

        events.push(ScanEvent::Line(line));
        if confirm {
            events.push(ScanEvent::Confirm);
        }
        if let Some(percent) = progress {
            events.push(ScanEvent::Progress(percent));
        }
    }
}

/// Leading integer of the first whitespace-separated token, `%` allowed.
pub fn parse_progress(line: &str) -> Option<u8> {
    let token = line.split_whitespace().next()?;
    let digits = token.strip_suffix('%').unwrap_or(token);
    let value: u64 = digits.parse().ok()?;
    Some(value.min(100) as u8)
}
