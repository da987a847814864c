//! Inline command substitution for input scripts and expected output.
//!
//! `{{ command }}` is replaced by the trimmed standard output of
//! `sh -c command`. Anything written to standard error fails the expansion.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use tracing::debug;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{(.*?)\}\}").expect("placeholder pattern is valid")
});

/// Expand every placeholder in `text`.
pub fn expand(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&run(inner.as_str().trim())?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Read `path` and expand it.
pub fn expand_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    expand(&content).with_context(|| format!("Failed to expand templates in {}", path.display()))
}

fn run(command: &str) -> Result<String> {
    debug!(command, "expanding template command");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run template command: {command}"))?;
    if !output.stderr.is_empty() {
        bail!(
            "Template command '{}' wrote to stderr: {}",
            command,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(expand("no braces here\n").unwrap(), "no braces here\n");
    }

    #[test]
    fn test_substitutes_trimmed_output() {
        assert_eq!(
            expand("value: {{ echo '  hi  ' }}!\n").unwrap(),
            "value: hi!\n"
        );
    }

    #[test]
    fn test_multiple_placeholders() {
        assert_eq!(
            expand("{{echo a}}-{{printf b}}-{{ echo c }}").unwrap(),
            "a-b-c"
        );
    }

    #[test]
    fn test_placeholder_may_span_lines() {
        assert_eq!(expand("{{ echo one\necho two }}").unwrap(), "one\ntwo");
    }

    #[test]
    fn test_stderr_fails_expansion() {
        let err = expand("x {{ echo oops >&2 }} y").unwrap_err().to_string();
        assert!(err.contains("wrote to stderr"), "got: {err}");
    }

    #[test]
    fn test_expand_file_missing() {
        assert!(expand_file("/definitely/not/here.txt").is_err());
    }
}
