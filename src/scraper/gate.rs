//! Render-completion gate.
//!
//! The portal is a single-page app: navigation "finishes" long before the
//! section content is in the DOM. Instead of sleeping a fixed amount we poll
//! snapshots until a readiness predicate holds or the budget runs out.

use scraper::{ElementRef, Html, Selector};
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::sections::{parse_selector, Section};
use super::session::Session;
use crate::errors::ExtractError;

/// Outcome of waiting for a page to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Ready(String),
    /// `last` is the final snapshot taken, if any succeeded
    TimedOut {
        waited: Duration,
        last: Option<String>,
    },
}

/// Readiness predicate: no visible loading indicator, content marker present,
/// and the section's root container rendered.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    loading: Option<Selector>,
    marker: Option<Selector>,
    root: Option<Selector>,
}

impl ReadinessProbe {
    pub fn new(loading: Option<&str>, marker: Option<&str>) -> Result<Self, ExtractError> {
        Ok(Self {
            loading: loading.map(parse_selector).transpose()?,
            marker: marker.map(parse_selector).transpose()?,
            root: None,
        })
    }

    /// Probe from configured selectors; an empty selector disables that
    /// part of the check.
    pub fn configured(loading_selector: &str, ready_selector: &str) -> Result<Self, ExtractError> {
        let loading = Some(loading_selector.trim()).filter(|s| !s.is_empty());
        let ready = Some(ready_selector.trim()).filter(|s| !s.is_empty());
        Self::new(loading, ready)
    }

    /// Also wait for `section`'s root container.
    pub fn with_root(mut self, section: Section) -> Result<Self, ExtractError> {
        self.root = Some(parse_selector(section.root_selector())?);
        Ok(self)
    }

    pub fn is_ready(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        self.settled(&document)
            && self
                .root
                .as_ref()
                .map_or(true, |root| document.select(root).next().is_some())
    }

    /// Loading finished and the marker is present, root container or not.
    ///
    /// A page that stays settled without its root for the whole budget has
    /// changed structure rather than rendered slowly.
    pub fn is_settled(&self, html: &str) -> bool {
        self.settled(&Html::parse_document(html))
    }

    fn settled(&self, document: &Html) -> bool {
        if let Some(loading) = &self.loading {
            if document.select(loading).any(|el| !is_hidden(el)) {
                return false;
            }
        }
        match &self.marker {
            Some(marker) => document.select(marker).next().is_some(),
            None => true,
        }
    }
}

/// Hidden by a `hidden` attribute, Angular's `ng-hide` class or an inline
/// `display: none`, on the element or any ancestor.
fn is_hidden(element: ElementRef<'_>) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| {
            let value = el.value();
            value.attr("hidden").is_some()
                || value.classes().any(|c| c == "ng-hide")
                || value.attr("style").is_some_and(|style| {
                    style
                        .split(';')
                        .filter_map(|decl| decl.split_once(':'))
                        .any(|(prop, val)| {
                            prop.trim().eq_ignore_ascii_case("display")
                                && val.trim().eq_ignore_ascii_case("none")
                        })
                })
        })
}

/// Poll `session` until `probe` accepts a snapshot or `timeout` elapses.
///
/// Never fails: snapshot errors count as "not ready yet". Each snapshot call
/// is bounded by whatever budget is left.
pub async fn await_ready<S: Session>(
    session: &mut S,
    probe: &ReadinessProbe,
    timeout: Duration,
    poll_interval: Duration,
) -> GateResult {
    let start = Instant::now();
    let mut polls = 0u32;
    let mut last = None;

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        polls += 1;
        match tokio::time::timeout(remaining, session.snapshot()).await {
            Ok(Ok(html)) => {
                if probe.is_ready(&html) {
                    debug!("Page ready after {} polls ({:?})", polls, start.elapsed());
                    return GateResult::Ready(html);
                }
                last = Some(html);
            }
            Ok(Err(e)) => debug!("Snapshot failed: {}", e),
            Err(_) => break,
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }

    GateResult::TimedOut {
        waited: start.elapsed(),
        last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::session::testing::{ScriptedPage, ScriptedSession};
    use crate::scraper::session::Session;

    const SPINNER: &str = r#"<html><body><span class="fa fa-spinner fa-spin"></span></body></html>"#;
    const READY: &str = r#"<html><body>
        <span class="fa fa-spinner ng-hide"></span>
        <div class="measure-groups"><div class="panel"><div class="panel-heading">G</div></div></div>
    </body></html>"#;

    fn probe() -> ReadinessProbe {
        ReadinessProbe::configured("span.fa-spinner", "div.measure-groups").unwrap()
    }

    #[test]
    fn test_visible_spinner_is_not_ready() {
        assert!(!probe().is_ready(SPINNER));
        assert!(probe().is_ready(READY));
    }

    #[test]
    fn test_hidden_spinner_variants() {
        let root = r#"<div class="measure-groups"></div>"#;
        for spinner in [
            r#"<span class="fa-spinner" hidden></span>"#,
            r#"<span class="fa-spinner" style="color: red; display: none"></span>"#,
            r#"<div style="DISPLAY:NONE"><span class="fa-spinner"></span></div>"#,
            r#"<div class="ng-hide"><span class="fa-spinner"></span></div>"#,
        ] {
            let html = format!("<html><body>{spinner}{root}</body></html>");
            assert!(probe().is_ready(&html), "{spinner}");
        }
    }

    #[test]
    fn test_missing_marker_is_not_ready() {
        assert!(!probe().is_ready("<html><body><p>Loaded</p></body></html>"));
    }

    #[test]
    fn test_empty_loading_selector_only_checks_marker() {
        let probe = ReadinessProbe::configured("", "div.measure-groups").unwrap();
        let html = r#"<span class="fa-spinner"></span><div class="measure-groups"></div>"#;
        assert!(probe.is_ready(html));
    }

    #[tokio::test]
    async fn test_ready_after_spinner() {
        let mut session = ScriptedSession::new().page(
            "u",
            ScriptedPage::Html(vec![SPINNER.to_string(), SPINNER.to_string(), READY.to_string()]),
        );
        session.navigate("u").await;

        let result = await_ready(
            &mut session,
            &probe(),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, GateResult::Ready(READY.to_string()));
    }

    #[tokio::test]
    async fn test_times_out_instead_of_failing() {
        let mut session = ScriptedSession::new().page("u", ScriptedPage::ready(SPINNER));
        session.navigate("u").await;

        let timeout = Duration::from_millis(30);
        let result = await_ready(&mut session, &probe(), timeout, Duration::from_millis(5)).await;
        match result {
            GateResult::TimedOut { waited, last } => {
                assert!(waited >= timeout);
                assert_eq!(last.as_deref(), Some(SPINNER));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_idempotent_on_ready_page() {
        let mut session = ScriptedSession::new().page("u", ScriptedPage::ready(READY));
        session.navigate("u").await;

        let poll = Duration::from_secs(10);
        let first = await_ready(&mut session, &probe(), Duration::from_secs(30), poll).await;
        let start = Instant::now();
        let second = await_ready(&mut session, &probe(), Duration::from_secs(30), poll).await;

        assert_eq!(first, second);
        // Returned on the first poll, without sleeping
        assert!(start.elapsed() < poll);
    }

    #[tokio::test]
    async fn test_no_page_counts_as_not_ready() {
        let mut session = ScriptedSession::new();
        let result = await_ready(
            &mut session,
            &probe(),
            Duration::from_millis(10),
            Duration::from_millis(2),
        )
        .await;
        assert!(matches!(result, GateResult::TimedOut { last: None, .. }));
    }

    fn section_probe() -> ReadinessProbe {
        ReadinessProbe::configured("span.fa-spinner", "h1")
            .unwrap()
            .with_root(Section::Properties)
            .unwrap()
    }

    const HEADER_ONLY: &str = r#"<html><body>
        <span class="fa fa-spinner ng-hide"></span>
        <h1><span>Readmission Rate</span></h1>
    </body></html>"#;
    const HEADER_AND_ROOT: &str = r#"<html><body>
        <span class="fa fa-spinner ng-hide"></span>
        <h1><span>Readmission Rate</span></h1>
        <div class="measure-properties"></div>
    </body></html>"#;

    #[test]
    fn test_header_without_root_is_settled_but_not_ready() {
        let probe = section_probe();
        assert!(probe.is_settled(HEADER_ONLY));
        assert!(!probe.is_ready(HEADER_ONLY));
        assert!(probe.is_ready(HEADER_AND_ROOT));
        assert!(!probe.is_settled(SPINNER));
    }

    #[tokio::test]
    async fn test_waits_for_section_root() {
        let mut session = ScriptedSession::new().page(
            "u",
            ScriptedPage::Html(vec![HEADER_ONLY.to_string(), HEADER_AND_ROOT.to_string()]),
        );
        session.navigate("u").await;

        let result = await_ready(
            &mut session,
            &section_probe(),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, GateResult::Ready(HEADER_AND_ROOT.to_string()));
    }
}
