//! Scripted input: classifying lines and pacing the drains between them.
//!
//! A script is plain text, one input line per line. Three tokens are special:
//!
//! | Line | Sent as |
//! |------|---------|
//! | `^C` | the terminal's interrupt byte |
//! | `^Z` | the terminal's suspend byte |
//! | `^D` | the terminal's end-of-file byte |
//!
//! A line that begins with the prompt (a transcript copied from a session) is
//! sent without the prompt and the whitespace after it.

use std::time::Duration;

/// How long the first drain waits when no prompt is configured.
pub const STARTUP_DELAY: Duration = Duration::from_millis(250);

/// How long to collect output after a line when the next line does not wait
/// for a prompt.
pub const PACING_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Interrupt,
    Suspend,
    EndOfFile,
}

impl ControlKey {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "^C" => Some(Self::Interrupt),
            "^Z" => Some(Self::Suspend),
            "^D" => Some(Self::EndOfFile),
            _ => None,
        }
    }
}

/// The bytes the terminal turns into signals or end-of-file, as configured
/// on the PTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlKeys {
    pub interrupt: u8,
    pub suspend: u8,
    pub end_of_file: u8,
}

impl ControlKeys {
    pub fn byte(&self, key: ControlKey) -> u8 {
        match key {
            ControlKey::Interrupt => self.interrupt,
            ControlKey::Suspend => self.suspend,
            ControlKey::EndOfFile => self.end_of_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLine {
    /// Written as a single control byte with echo suppressed.
    Control(ControlKey),
    /// Written verbatim followed by a newline.
    Text(String),
}

impl ScriptLine {
    /// The bytes to write for this line.
    pub fn bytes(&self, keys: &ControlKeys) -> Vec<u8> {
        match self {
            ScriptLine::Control(key) => vec![keys.byte(*key)],
            ScriptLine::Text(text) => {
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(b'\n');
                bytes
            }
        }
    }
}

/// Target and deadline for the drain that follows a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPlan<'a> {
    pub budget: Duration,
    pub target: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct Script {
    prompt: Option<String>,
    raw: Vec<String>,
    lines: Vec<ScriptLine>,
}

impl Script {
    pub fn parse(text: &str, prompt: Option<&str>) -> Self {
        let prompt = prompt
            .filter(|p| !p.trim_end().is_empty())
            .map(str::to_string);
        let raw: Vec<String> = text.lines().map(str::to_string).collect();
        let lines = raw
            .iter()
            .map(|line| classify(line, prompt.as_deref()))
            .collect();
        Self { prompt, raw, lines }
    }

    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Plan the drain after line `index` has been written, given what is left
    /// of the timeout.
    pub fn plan_after(&self, index: usize, remaining: Duration) -> DrainPlan<'_> {
        match self.raw.get(index + 1) {
            None => DrainPlan {
                budget: remaining,
                target: None,
            },
            Some(next) if self.starts_with_prompt(next) => DrainPlan {
                budget: remaining,
                target: self.prompt.as_deref(),
            },
            Some(_) => DrainPlan {
                budget: PACING_DELAY.min(remaining),
                target: None,
            },
        }
    }

    fn starts_with_prompt(&self, line: &str) -> bool {
        self.prompt
            .as_deref()
            .is_some_and(|prompt| line.starts_with(prompt))
    }
}

fn classify(line: &str, prompt: Option<&str>) -> ScriptLine {
    if let Some(key) = ControlKey::from_token(line.trim()) {
        return ScriptLine::Control(key);
    }
    let text = prompt
        .and_then(|p| line.strip_prefix(p))
        .map(str::trim_start)
        .unwrap_or(line);
    ScriptLine::Text(text.to_string())
}
