//! Identifier resolution: external measure code (CMIT ID) to the portal's
//! numeric variant id, plus target list loading.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use tracing::{debug, warn};

/// Maps an external code to the handle used in page URLs.
///
/// `None` means the code is unknown; that is a normal outcome the crawler
/// records, not an error.
pub trait Resolver {
    fn resolve(&self, code: &str) -> Option<u32>;
}

/// Code to variant id lookup table
#[derive(Debug, Clone, Default)]
pub struct VariantMap {
    ids: HashMap<String, u32>,
}

impl VariantMap {
    /// Build from pairs. The first handle seen for a code wins.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let mut ids = HashMap::new();
        for (code, handle) in pairs {
            let code = code.as_ref().trim();
            if code.is_empty() {
                continue;
            }
            match ids.get(code) {
                Some(&existing) if existing != handle => {
                    warn!(
                        "Code {} maps to both {} and {}; keeping {}",
                        code, existing, handle, existing
                    );
                }
                Some(_) => {}
                None => {
                    ids.insert(code.to_string(), handle);
                }
            }
        }
        Self { ids }
    }

    /// Load a mapping CSV with `cmit_id` and `variant_id` columns
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
        Self::from_csv_bytes(bytes)
            .with_context(|| format!("Invalid mapping file {}", path.display()))
    }

    pub fn from_csv_bytes(bytes: Vec<u8>) -> Result<Self> {
        // Read every column as text; ids like 00123 must keep their zeros
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;

        let codes = find_column(&df, "cmit_id")?.str()?;
        let variants = find_column(&df, "variant_id")?.str()?;

        let mut pairs = Vec::with_capacity(df.height());
        for (code, variant) in codes.into_iter().zip(variants.into_iter()) {
            let (Some(code), Some(variant)) = (code, variant) else {
                continue;
            };
            match parse_variant_id(variant) {
                Some(handle) => pairs.push((code.to_string(), handle)),
                None => warn!("Skipping {}: unusable variant id '{}'", code, variant),
            }
        }
        debug!("Loaded {} mapping rows", pairs.len());
        Ok(Self::from_pairs(pairs))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Resolver for VariantMap {
    fn resolve(&self, code: &str) -> Option<u32> {
        self.ids.get(code.trim()).copied()
    }
}

/// Column lookup tolerant of header case and padding
fn find_column<'a>(df: &'a DataFrame, wanted: &str) -> Result<&'a Column> {
    match df
        .get_columns()
        .iter()
        .find(|c| c.name().trim().eq_ignore_ascii_case(wanted))
    {
        Some(column) => Ok(column),
        None => bail!("missing '{}' column", wanted),
    }
}

/// Variant ids sometimes come through spreadsheets as `123.0`
fn parse_variant_id(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<u32>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value) {
        Some(value as u32)
    } else {
        None
    }
}

/// Read a target list file, one code per line
pub fn load_targets(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read target list {}", path.display()))?;
    Ok(parse_targets(&text))
}

/// Blank lines, `#` comments and a `cmit_id` header line are ignored
pub fn parse_targets(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| !line.eq_ignore_ascii_case("cmit_id"))
        .map(str::to_string)
        .collect()
}
