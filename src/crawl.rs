//! Crawl orchestrator.
//!
//! Drives every (identifier, section) pair through
//! navigate → await render → classify → extract, retrying transient
//! failures, and writes one terminal audit entry per pair. A [`Crawler`]
//! owns all accumulated state for one run and is consumed into a
//! [`CrawlReport`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scraper::Html;
use tokio::time::Duration;
use tracing::{debug, info};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::config::AppConfig;
use crate::errors::CrawlError;
use crate::resolver::Resolver;
use crate::retry::RetryConfig;
use crate::scraper::classify::{classify, PageOutcome, TransientCause};
use crate::scraper::gate::{await_ready, GateResult, ReadinessProbe};
use crate::scraper::sections::{extract_from, extract_metadata};
use crate::scraper::{section_url, NavigationResult, RateLimiter, Section, Session};
use crate::types::{FailureKind, MeasureRecord, SectionResult};

/// Shared stop signal, set from the Ctrl-C handler
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs the orchestrator needs, lifted out of [`AppConfig`]
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: String,
    pub loading_selector: String,
    pub ready_selector: String,
    pub gate_timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl CrawlSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.portal.base_url.clone(),
            loading_selector: config.gate.loading_selector.clone(),
            ready_selector: config.gate.ready_selector.clone(),
            gate_timeout: config.gate.timeout(),
            poll_interval: config.gate.poll_interval(),
            retry: config.retry.retry_config(),
        }
    }
}

/// Everything a run produced, also when it was cancelled
#[derive(Debug)]
pub struct CrawlReport {
    pub records: Vec<MeasureRecord>,
    pub audit: AuditLog,
    pub cancelled: bool,
}

/// How one section visit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Recorded,
    Invalid,
    Failed,
    Cancelled,
}

/// Per-page state machine
enum VisitState {
    Navigating,
    AwaitingRender(NavigationResult),
    Classifying(NavigationResult, Option<GateResult>),
    Extracting(String),
    Retrying(TransientCause),
}

pub struct Crawler<'a, S: Session, R: Resolver> {
    session: &'a mut S,
    resolver: &'a R,
    settings: CrawlSettings,
    limiter: RateLimiter,
    cancel: CancelFlag,
    completed: HashSet<String>,
    records: Vec<MeasureRecord>,
    audit: AuditLog,
}

impl<'a, S: Session, R: Resolver> Crawler<'a, S, R> {
    pub fn new(
        session: &'a mut S,
        resolver: &'a R,
        settings: CrawlSettings,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            session,
            resolver,
            settings,
            limiter,
            cancel: CancelFlag::new(),
            completed: HashSet::new(),
            records: Vec::new(),
            audit: AuditLog::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Skip identifiers a previous run already finished
    pub fn resume_from(mut self, previous: &AuditLog) -> Self {
        self.completed = previous.completed_codes();
        self
    }

    /// Crawl `targets` in order. Duplicates are crawled once.
    pub async fn run(mut self, targets: &[String]) -> CrawlReport {
        let mut seen = HashSet::new();
        let mut cancelled = false;

        for code in targets {
            let code = code.trim();
            if code.is_empty() || !seen.insert(code.to_string()) {
                continue;
            }
            if self.completed.contains(code) {
                debug!("Skipping {}: finished in a previous run", code);
                continue;
            }
            if self.cancel.is_cancelled() || !self.crawl_code(code).await {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            info!(
                "Crawl cancelled after {} identifiers; keeping partial results",
                self.records.len()
            );
        } else {
            info!("Crawl finished: {} identifiers visited", self.records.len());
        }

        CrawlReport {
            records: self.records,
            audit: self.audit,
            cancelled,
        }
    }

    /// Returns false when the run was cancelled mid-identifier
    async fn crawl_code(&mut self, code: &str) -> bool {
        let Some(handle) = self.resolver.resolve(code) else {
            let err = CrawlError::Resolution {
                code: code.to_string(),
            };
            self.audit
                .record(AuditEntry::new(code, AuditOutcome::Unresolved).detail(err.to_string()));
            return true;
        };

        info!("Crawling {} (variant {})", code, handle);
        let mut record = MeasureRecord::new(code, handle);
        let mut finished = true;

        for section in Section::ALL {
            if record.is_invalid() {
                self.audit.record(
                    AuditEntry::new(code, AuditOutcome::Skipped)
                        .handle(handle)
                        .section(section)
                        .detail("Properties page not found"),
                );
                continue;
            }

            match self.visit(&mut record, section).await {
                Visit::Invalid if section == Section::Properties => record.mark_invalid(),
                Visit::Cancelled => {
                    finished = false;
                    break;
                }
                Visit::Recorded | Visit::Invalid | Visit::Failed => {}
            }
        }

        // Cancelled before the first page: nothing to flush
        if !record.sections.is_empty() {
            self.records.push(record);
        }
        finished
    }

    async fn visit(&mut self, record: &mut MeasureRecord, section: Section) -> Visit {
        let url = section_url(&self.settings.base_url, record.handle, section);
        let probe = match ReadinessProbe::configured(
            &self.settings.loading_selector,
            &self.settings.ready_selector,
        )
        .and_then(|probe| probe.with_root(section))
        {
            Ok(probe) => probe,
            Err(e) => {
                // Misconfigured selector; every page would fail the same way
                return self.fail(record, section, 0, FailureKind::Extraction, e.to_string());
            }
        };

        let total = self.settings.retry.total_attempts();
        let mut attempt = 1;
        let mut state = VisitState::Navigating;
        // Last snapshot that settled without the section root
        let mut stalled: Option<String> = None;

        loop {
            state = match state {
                VisitState::Navigating => {
                    if self.cancel.is_cancelled() {
                        return Visit::Cancelled;
                    }
                    stalled = None;
                    self.limiter.acquire().await;
                    debug!("GET {} (attempt {}/{})", url, attempt, total);
                    match self.session.navigate(&url).await {
                        loaded @ NavigationResult::Loaded { .. } => VisitState::AwaitingRender(loaded),
                        other => VisitState::Classifying(other, None),
                    }
                }
                VisitState::AwaitingRender(navigation) => {
                    let gate = await_ready(
                        &mut *self.session,
                        &probe,
                        self.settings.gate_timeout,
                        self.settings.poll_interval,
                    )
                    .await;
                    if let GateResult::TimedOut { last: Some(html), .. } = &gate {
                        if probe.is_settled(html) {
                            stalled = Some(html.clone());
                        }
                    }
                    VisitState::Classifying(navigation, Some(gate))
                }
                VisitState::Classifying(navigation, gate) => match classify(navigation, gate) {
                    PageOutcome::Valid(html) => VisitState::Extracting(html),
                    PageOutcome::Invalid(reason) => {
                        self.audit.record(
                            AuditEntry::new(&record.code, AuditOutcome::Invalid)
                                .handle(record.handle)
                                .section(section)
                                .attempt(attempt)
                                .detail(reason.to_string()),
                        );
                        record.record_section(
                            section,
                            SectionResult::Failed {
                                kind: FailureKind::Invalid,
                                detail: reason.to_string(),
                            },
                        );
                        return Visit::Invalid;
                    }
                    PageOutcome::TransientError(cause) if attempt < total => VisitState::Retrying(cause),
                    PageOutcome::TransientError(cause) => {
                        if let (TransientCause::RenderTimeout { .. }, Some(html)) =
                            (&cause, stalled.take())
                        {
                            // Rendered and idle, but the root selector matches nothing
                            return self.extract(record, section, attempt, &url, &html);
                        }
                        let err = match cause {
                            TransientCause::RenderTimeout { waited } => CrawlError::RenderTimeout {
                                url: url.clone(),
                                waited,
                            },
                            TransientCause::NavigationFailure(cause) => CrawlError::Navigation {
                                url: url.clone(),
                                cause,
                            },
                        };
                        let detail = format!("{} (gave up after {} attempts)", err, attempt);
                        return self.fail(record, section, attempt, FailureKind::Transient, detail);
                    }
                },
                VisitState::Retrying(cause) => {
                    let delay = self.settings.retry.delay_for_attempt(attempt - 1);
                    self.audit.record(
                        AuditEntry::new(&record.code, AuditOutcome::Retrying)
                            .handle(record.handle)
                            .section(section)
                            .attempt(attempt)
                            .detail(format!("{}; retrying in {:?}", cause, delay)),
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    VisitState::Navigating
                }
                VisitState::Extracting(html) => {
                    return self.extract(record, section, attempt, &url, &html);
                }
            };
        }
    }

    fn extract(
        &mut self,
        record: &mut MeasureRecord,
        section: Section,
        attempt: u32,
        url: &str,
        html: &str,
    ) -> Visit {
        let document = Html::parse_document(html);

        let metadata = extract_metadata(&document);
        for conflict in record.observe_metadata(section, &metadata) {
            let err = CrawlError::MetadataMismatch {
                field: conflict.field,
                first: conflict.first.clone(),
                first_section: conflict.first_section.name(),
                second: conflict.second.clone(),
                second_section: conflict.second_section.name(),
            };
            self.audit.record(
                AuditEntry::new(&record.code, AuditOutcome::MetadataMismatch)
                    .handle(record.handle)
                    .section(section)
                    .attempt(attempt)
                    .detail(err.to_string()),
            );
        }

        match extract_from(&document, section) {
            Ok(table) => {
                self.audit.record(
                    AuditEntry::new(&record.code, AuditOutcome::Recorded)
                        .handle(record.handle)
                        .section(section)
                        .attempt(attempt)
                        .detail(format!("{} rows", table.len())),
                );
                record.record_section(section, SectionResult::Extracted(table));
                Visit::Recorded
            }
            Err(source) => {
                let err = CrawlError::Extraction {
                    url: url.to_string(),
                    source,
                };
                self.fail(record, section, attempt, FailureKind::Extraction, err.to_string())
            }
        }
    }

    /// Record a terminal failure for the pair
    fn fail(
        &mut self,
        record: &mut MeasureRecord,
        section: Section,
        attempt: u32,
        kind: FailureKind,
        detail: String,
    ) -> Visit {
        let outcome = match kind {
            FailureKind::Extraction => AuditOutcome::ExtractionFailed,
            FailureKind::Transient | FailureKind::Invalid => AuditOutcome::Failed,
        };
        self.audit.record(
            AuditEntry::new(&record.code, outcome)
                .handle(record.handle)
                .section(section)
                .attempt(attempt)
                .detail(detail.clone()),
        );
        record.record_section(section, SectionResult::Failed { kind, detail });
        Visit::Failed
    }
}
