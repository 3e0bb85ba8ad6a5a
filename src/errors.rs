//! Error types for the crawl engine.
//!
//! Per-page problems never abort a run: they are caught by the crawler,
//! turned into audit entries and the crawl moves on. Only a browser that
//! cannot be started at all is fatal.

use std::time::Duration;

use thiserror::Error;

use crate::scraper::sections::Section;

/// Failures that can happen while crawling one identifier/section pair.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("measure code '{code}' has no variant id in the mapping")]
    Resolution { code: String },

    #[error("navigation to {url} failed: {cause}")]
    Navigation { url: String, cause: String },

    #[error("{url} did not finish rendering within {waited:?}")]
    RenderTimeout { url: String, waited: Duration },

    #[error("{url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: ExtractError,
    },

    #[error("metadata field '{field}' disagrees: '{first}' ({first_section}) vs '{second}' ({second_section})")]
    MetadataMismatch {
        field: &'static str,
        first: String,
        first_section: &'static str,
        second: String,
        second_section: &'static str,
    },

    #[error("could not start browser session: {0}")]
    SessionStart(String),
}

/// The rendered page does not have the shape a section extractor expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("{section:?} root selector '{selector}' not found on page")]
    SelectorNotFound { section: Section, selector: String },

    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// Errors surfaced by a browser session outside of navigation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no page is loaded in the session")]
    NoPage,

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_keeps_selector_context() {
        let err = CrawlError::Extraction {
            url: "https://portal.example/m?variantId=7&sectionNumber=5".to_string(),
            source: ExtractError::SelectorNotFound {
                section: Section::Groups,
                selector: "div.measure-groups".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("variantId=7"));
        assert!(text.contains("Groups"));
        assert!(text.contains("div.measure-groups"));
    }

    #[test]
    fn test_metadata_mismatch_reports_both_values() {
        let err = CrawlError::MetadataMismatch {
            field: "Program",
            first: "HQR".to_string(),
            first_section: "Properties",
            second: "MIPS".to_string(),
            second_section: "Groups",
        };
        let text = err.to_string();
        assert!(text.contains("HQR"));
        assert!(text.contains("MIPS"));
    }
}
