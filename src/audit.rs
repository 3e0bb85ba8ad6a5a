//! Append-only audit log of every (identifier, section) attempt.
//!
//! The log is the run's source of truth for what happened: it is written as
//! JSON Lines next to the flat table and read back to resume a crawl.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::scraper::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Code has no variant id; nothing was navigated
    Unresolved,
    Recorded,
    /// Portal reported the page as not found
    Invalid,
    /// Not visited because Properties was invalid
    Skipped,
    /// A transient failure that will be attempted again
    Retrying,
    /// Retries exhausted
    Failed,
    /// Page rendered but did not have the expected structure
    ExtractionFailed,
    /// Two section pages disagree on a metadata field
    MetadataMismatch,
}

impl AuditOutcome {
    /// Terminal outcomes close an (identifier, section) pair
    pub fn is_terminal(self) -> bool {
        !matches!(self, AuditOutcome::Retrying | AuditOutcome::MetadataMismatch)
    }

    pub fn severity(self) -> Severity {
        match self {
            AuditOutcome::Recorded | AuditOutcome::Invalid | AuditOutcome::Skipped => Severity::Info,
            AuditOutcome::Unresolved | AuditOutcome::Retrying => Severity::Warn,
            AuditOutcome::Failed | AuditOutcome::MetadataMismatch => Severity::Error,
            AuditOutcome::ExtractionFailed => Severity::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuditOutcome::Unresolved => "unresolved",
            AuditOutcome::Recorded => "recorded",
            AuditOutcome::Invalid => "invalid",
            AuditOutcome::Skipped => "skipped",
            AuditOutcome::Retrying => "retrying",
            AuditOutcome::Failed => "failed",
            AuditOutcome::ExtractionFailed => "extraction_failed",
            AuditOutcome::MetadataMismatch => "metadata_mismatch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub code: String,
    #[serde(default)]
    pub handle: Option<u32>,
    #[serde(default)]
    pub section: Option<Section>,
    pub outcome: AuditOutcome,
    pub severity: Severity,
    /// 1-based navigation attempt, 0 when nothing was navigated
    #[serde(default)]
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detail: String,
}

impl AuditEntry {
    pub fn new(code: &str, outcome: AuditOutcome) -> Self {
        Self {
            code: code.to_string(),
            handle: None,
            section: None,
            outcome,
            severity: outcome.severity(),
            attempt: 0,
            timestamp: Utc::now(),
            detail: String::new(),
        }
    }

    pub fn handle(mut self, handle: u32) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.section = Some(section);
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.code)?;
        if let Some(handle) = self.handle {
            write!(f, " (variant {})", handle)?;
        }
        if let Some(section) = self.section {
            write!(f, " {}", section.name())?;
        }
        write!(f, ": {}", self.outcome.as_str())?;
        if self.attempt > 0 {
            write!(f, " on attempt {}", self.attempt)?;
        }
        if !self.detail.is_empty() {
            write!(f, " - {}", self.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and mirror it to the tracing log
    pub fn record(&mut self, entry: AuditEntry) {
        match entry.severity {
            Severity::Info => info!("{}", entry),
            Severity::Warn => warn!("{}", entry),
            Severity::Error | Severity::Critical => error!("{}", entry),
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `other`'s entries without re-logging them
    pub fn extend(&mut self, other: AuditLog) {
        self.entries.extend(other.entries);
    }

    /// One JSON object per line
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> Result<()> {
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line)
                .with_context(|| format!("Invalid audit entry on line {}", i + 1))?;
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        Self::read_jsonl(BufReader::new(file))
            .with_context(|| format!("Failed to read audit log {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create audit log {}", path.display()))?;
        self.write_jsonl(BufWriter::new(file))
    }

    /// Codes whose crawl is finished: unresolved, or a terminal entry for
    /// every section
    pub fn completed_codes(&self) -> HashSet<String> {
        let mut unresolved = HashSet::new();
        let mut finished: BTreeMap<&str, HashSet<Section>> = BTreeMap::new();

        for entry in self.entries.iter().filter(|e| e.outcome.is_terminal()) {
            match entry.section {
                Some(section) => {
                    finished.entry(entry.code.as_str()).or_default().insert(section);
                }
                None if entry.outcome == AuditOutcome::Unresolved => {
                    unresolved.insert(entry.code.clone());
                }
                None => {}
            }
        }

        finished
            .into_iter()
            .filter(|(_, sections)| sections.len() == Section::ALL.len())
            .map(|(code, _)| code.to_string())
            .chain(unresolved)
            .collect()
    }

    /// Targets a resumed crawl still has to attempt, in target order
    pub fn pending(&self, targets: &[String]) -> Vec<String> {
        let completed = self.completed_codes();
        let mut seen = HashSet::new();
        targets
            .iter()
            .filter(|code| !completed.contains(code.as_str()))
            .filter(|code| seen.insert(code.as_str()))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> AuditSummary {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.outcome).or_insert(0) += 1;
        }
        let identifiers = self
            .entries
            .iter()
            .map(|e| e.code.as_str())
            .collect::<HashSet<_>>()
            .len();
        let mut flagged: Vec<AuditEntry> = self
            .entries
            .iter()
            .filter(|e| e.severity >= Severity::Error)
            .cloned()
            .collect();
        // Critical first, then log order
        flagged.sort_by(|a, b| b.severity.cmp(&a.severity));

        AuditSummary {
            total: self.entries.len(),
            identifiers,
            counts,
            flagged,
        }
    }
}

/// Counts per outcome plus the entries that need attention
#[derive(Debug, Clone)]
pub struct AuditSummary {
    pub total: usize,
    pub identifiers: usize,
    pub counts: BTreeMap<AuditOutcome, usize>,
    pub flagged: Vec<AuditEntry>,
}

impl AuditSummary {
    pub fn count(&self, outcome: AuditOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Audit: {} entries for {} identifiers",
            self.total, self.identifiers
        )?;
        for (outcome, count) in &self.counts {
            writeln!(f, "  {:<18} {:>6}", outcome.as_str(), count)?;
        }
        if !self.flagged.is_empty() {
            writeln!(f, "Needs attention:")?;
            for entry in &self.flagged {
                writeln!(f, "  {}", entry)?;
            }
        }
        Ok(())
    }
}
