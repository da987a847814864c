//! Test-suite documents.
//!
//! A suite is a YAML file with suite-wide defaults and a list of tests. It is
//! deserialized into raw, all-optional types and then resolved once into
//! fully defaulted [`TestCase`]s, so nothing downstream checks for presence.

use crate::request::ExecutionRequest;
use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_COMMAND: &str = "bash";
pub const DEFAULT_POINTS: u32 = 1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Suite-level defaults followed by the tests.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteFile {
    command: Option<String>,
    prompt: Option<String>,
    points: Option<u32>,
    timeout: Option<u64>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    use_valgrind: Option<bool>,
    valgrind_opts: Option<String>,
    tests: Vec<TestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestEntry {
    name: String,
    #[serde(default)]
    description: String,
    output_file: PathBuf,
    input_file: Option<PathBuf>,
    command: Option<String>,
    prompt: Option<String>,
    points: Option<u32>,
    timeout: Option<u64>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    use_valgrind: Option<bool>,
    valgrind_opts: Option<String>,
}

/// One fully resolved test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    pub output_file: PathBuf,
    pub input_file: Option<PathBuf>,
    pub command: String,
    /// Only set for tests with an input file.
    pub prompt: Option<String>,
    pub points: u32,
    pub timeout: Duration,
    pub environment: BTreeMap<String, String>,
    pub use_valgrind: bool,
    pub valgrind_opts: String,
}

impl TestCase {
    /// File-name-safe form of the name, used for result files.
    pub fn slug(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }

    pub fn request(&self, working_dir: &Path) -> ExecutionRequest {
        let mut request = ExecutionRequest::new(self.command.clone())
            .with_timeout(self.timeout)
            .with_environment(self.environment.clone())
            .with_working_dir(working_dir);
        if let Some(input) = &self.input_file {
            request = request.with_input(input.clone());
        }
        if let Some(prompt) = &self.prompt {
            request = request.with_prompt(prompt.clone());
        }
        if self.use_valgrind {
            request = request.with_valgrind(self.valgrind_opts.clone());
        }
        request
    }
}

#[derive(Debug, Clone)]
pub struct Suite {
    pub path: PathBuf,
    pub tests: Vec<TestCase>,
}

impl Suite {
    /// Load and resolve a suite file. Relative test file paths are taken
    /// relative to the suite file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file: {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let tests = parse(&content, base)
            .with_context(|| format!("Invalid suite file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            tests,
        })
    }

    /// Keep only the named tests, in suite order.
    pub fn select(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            ensure!(
                self.tests.iter().any(|t| &t.name == name),
                "No test named '{name}' in {}",
                self.path.display()
            );
        }
        self.tests.retain(|t| names.contains(&t.name));
        Ok(())
    }

    pub fn uses_valgrind(&self) -> bool {
        self.tests.iter().any(|t| t.use_valgrind)
    }
}

/// Parse suite YAML, resolving file paths against `base`.
pub fn parse(content: &str, base: &Path) -> Result<Vec<TestCase>> {
    let mut file: SuiteFile =
        serde_yaml::from_str(content).context("Malformed suite document")?;
    ensure!(!file.tests.is_empty(), "Suite defines no tests");

    let entries = std::mem::take(&mut file.tests);
    let mut seen = HashSet::new();
    let mut slugs: HashMap<String, String> = HashMap::new();
    let mut tests = Vec::with_capacity(entries.len());
    for entry in entries {
        ensure!(
            seen.insert(entry.name.clone()),
            "Duplicate test name: {}",
            entry.name
        );
        let test = resolve(entry, &file, base)?;
        if let Some(other) = slugs.insert(test.slug(), test.name.clone()) {
            bail!(
                "Tests '{other}' and '{}' would share result files named '{}'",
                test.name,
                test.slug()
            );
        }
        tests.push(test);
    }
    Ok(tests)
}

fn resolve(entry: TestEntry, suite: &SuiteFile, base: &Path) -> Result<TestCase> {
    let name = entry.name;

    let output_file = base.join(&entry.output_file);
    if !output_file.is_file() {
        bail!(
            "Test '{name}': output_file does not exist: {}",
            output_file.display()
        );
    }
    let input_file = entry.input_file.map(|p| base.join(p));
    if let Some(input) = &input_file {
        if !input.is_file() {
            bail!(
                "Test '{name}': input_file does not exist: {}",
                input.display()
            );
        }
    }

    let timeout = entry
        .timeout
        .or(suite.timeout)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    ensure!(timeout > 0, "Test '{name}': timeout must be at least one second");

    let prompt = if input_file.is_some() {
        entry.prompt.or_else(|| suite.prompt.clone())
    } else {
        if entry.prompt.is_some() {
            warn!(test = %name, "prompt ignored for a test without an input_file");
        }
        None
    };

    let mut environment = suite.environment.clone();
    environment.extend(entry.environment);

    Ok(TestCase {
        description: entry.description,
        output_file,
        input_file,
        command: entry
            .command
            .or_else(|| suite.command.clone())
            .unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
        prompt,
        points: entry.points.or(suite.points).unwrap_or(DEFAULT_POINTS),
        timeout: Duration::from_secs(timeout),
        environment,
        use_valgrind: entry.use_valgrind.or(suite.use_valgrind).unwrap_or(false),
        valgrind_opts: entry
            .valgrind_opts
            .or_else(|| suite.valgrind_opts.clone())
            .unwrap_or_default(),
        name,
    })
}
