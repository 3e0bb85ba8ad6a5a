//! Validity classifier: turns a navigation plus gate result into the one
//! outcome the crawler acts on.

use std::fmt;

use tokio::time::Duration;

use super::gate::GateResult;
use super::session::NavigationResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Rendered page ready for extraction
    Valid(String),
    /// The measure/section does not exist; not retried
    Invalid(InvalidReason),
    /// Worth another attempt
    TransientError(TransientCause),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    NotFound { final_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientCause {
    RenderTimeout { waited: Duration },
    NavigationFailure(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::NotFound { final_url } => write!(f, "not found (landed on {})", final_url),
        }
    }
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientCause::RenderTimeout { waited } => {
                write!(f, "render timeout after {:.1}s", waited.as_secs_f64())
            }
            TransientCause::NavigationFailure(cause) => write!(f, "navigation failed: {}", cause),
        }
    }
}

/// `gate` is `None` when navigation did not load a page, since there was
/// nothing to wait for.
pub fn classify(navigation: NavigationResult, gate: Option<GateResult>) -> PageOutcome {
    match (navigation, gate) {
        (NavigationResult::Failed { cause }, _) => {
            PageOutcome::TransientError(TransientCause::NavigationFailure(cause))
        }
        (NavigationResult::NotFound { final_url }, _) => {
            PageOutcome::Invalid(InvalidReason::NotFound { final_url })
        }
        (NavigationResult::Loaded { .. }, Some(GateResult::Ready(html))) => PageOutcome::Valid(html),
        (NavigationResult::Loaded { .. }, Some(GateResult::TimedOut { waited, .. })) => {
            PageOutcome::TransientError(TransientCause::RenderTimeout { waited })
        }
        (NavigationResult::Loaded { final_url }, None) => {
            PageOutcome::TransientError(TransientCause::NavigationFailure(format!(
                "{} loaded but was never checked for readiness",
                final_url
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> NavigationResult {
        NavigationResult::Loaded {
            final_url: "https://portal.example/#/MeasureView?variantId=7&sectionNumber=1".to_string(),
        }
    }

    #[test]
    fn test_loaded_and_ready_is_valid() {
        let outcome = classify(loaded(), Some(GateResult::Ready("<html/>".to_string())));
        assert_eq!(outcome, PageOutcome::Valid("<html/>".to_string()));
    }

    #[test]
    fn test_not_found_wins_over_gate() {
        let nav = NavigationResult::NotFound {
            final_url: "https://portal.example/#/error".to_string(),
        };
        for gate in [None, Some(GateResult::Ready(String::new()))] {
            assert!(matches!(
                classify(nav.clone(), gate),
                PageOutcome::Invalid(InvalidReason::NotFound { .. })
            ));
        }
    }

    #[test]
    fn test_render_timeout_is_transient() {
        let waited = Duration::from_secs(30);
        let outcome = classify(loaded(), Some(GateResult::TimedOut { waited, last: None }));
        assert_eq!(
            outcome,
            PageOutcome::TransientError(TransientCause::RenderTimeout { waited })
        );
    }

    #[test]
    fn test_navigation_failure_is_transient() {
        let nav = NavigationResult::Failed {
            cause: "net::ERR_CONNECTION_RESET".to_string(),
        };
        match classify(nav, None) {
            PageOutcome::TransientError(TransientCause::NavigationFailure(cause)) => {
                assert!(cause.contains("ERR_CONNECTION_RESET"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unchecked_load_is_transient() {
        assert!(matches!(
            classify(loaded(), None),
            PageOutcome::TransientError(TransientCause::NavigationFailure(_))
        ));
    }

    #[test]
    fn test_cause_display() {
        let cause = TransientCause::RenderTimeout {
            waited: Duration::from_millis(1500),
        };
        assert_eq!(cause.to_string(), "render timeout after 1.5s");
    }
}
