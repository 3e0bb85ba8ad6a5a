//! Scraping engine for the measure portal
//!
//! Browser session, render gate, page classification and section extraction.

pub mod browser;
pub mod classify;
pub mod gate;
pub mod rate_limiter;
pub mod sections;
pub mod session;

pub use browser::ChromeSession;
pub use rate_limiter::RateLimiter;
pub use sections::Section;
pub use session::{NavigationResult, Session};

/// Default measure view route of the portal
pub const BASE_URL: &str = "https://cmit.cms.gov/cmit/#/MeasureView";

/// Build a section page URL
pub fn section_url(base_url: &str, handle: u32, section: Section) -> String {
    format!(
        "{}?variantId={}&sectionNumber={}",
        base_url,
        handle,
        section.number()
    )
}
