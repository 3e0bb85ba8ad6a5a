//! Browser session boundary.
//!
//! The crawler only needs three things from a browser: go to a URL, read the
//! current DOM, and shut down. Keeping that behind a trait lets the gate and
//! the orchestrator run against a scripted session in tests.

use crate::errors::SessionError;

/// What happened when the session was pointed at a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationResult {
    /// A page loaded; its content may still be rendering
    Loaded { final_url: String },
    /// The portal redirected to its error route
    NotFound { final_url: String },
    /// Navigation itself failed (network, protocol, timeout)
    Failed { cause: String },
}

#[allow(async_fn_in_trait)]
pub trait Session {
    async fn navigate(&mut self, url: &str) -> NavigationResult;

    /// Current DOM of the loaded page, serialized as HTML
    async fn snapshot(&mut self) -> Result<String, SessionError>;

    async fn close(self) -> anyhow::Result<()>;
}

/// True when `url` contains one of the portal's error-route markers.
pub fn is_not_found_url(url: &str, markers: &[String]) -> bool {
    let url = url.to_lowercase();
    markers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .any(|m| url.contains(&m))
}

#[cfg(test)]
pub mod testing {
    //! In-memory session driven by per-URL scripts.

    use std::collections::{HashMap, VecDeque};

    use super::{NavigationResult, Session};
    use crate::errors::SessionError;

    /// Scripted response to one navigation.
    #[derive(Debug, Clone)]
    pub enum ScriptedPage {
        /// Page loads; successive snapshots return these documents, the last
        /// one repeating
        Html(Vec<String>),
        NotFound,
        Fail(String),
    }

    impl ScriptedPage {
        pub fn ready(html: &str) -> Self {
            ScriptedPage::Html(vec![html.to_string()])
        }
    }

    #[derive(Debug, Default)]
    pub struct ScriptedSession {
        scripts: HashMap<String, VecDeque<ScriptedPage>>,
        fallback: Option<ScriptedPage>,
        current: Option<(Vec<String>, usize)>,
        pub visits: Vec<String>,
    }

    impl ScriptedSession {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for the next navigation to `url`
        pub fn page(mut self, url: &str, page: ScriptedPage) -> Self {
            self.scripts.entry(url.to_string()).or_default().push_back(page);
            self
        }

        /// Response for URLs with nothing queued
        pub fn otherwise(mut self, page: ScriptedPage) -> Self {
            self.fallback = Some(page);
            self
        }

        pub fn visits_to(&self, url: &str) -> usize {
            self.visits.iter().filter(|v| v.as_str() == url).count()
        }
    }

    impl Session for ScriptedSession {
        async fn navigate(&mut self, url: &str) -> NavigationResult {
            self.visits.push(url.to_string());
            self.current = None;

            let page = self
                .scripts
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .or_else(|| self.fallback.clone());

            match page {
                Some(ScriptedPage::Html(snapshots)) => {
                    self.current = Some((snapshots, 0));
                    NavigationResult::Loaded {
                        final_url: url.to_string(),
                    }
                }
                Some(ScriptedPage::NotFound) => NavigationResult::NotFound {
                    final_url: "https://portal.example/#/error".to_string(),
                },
                Some(ScriptedPage::Fail(cause)) => NavigationResult::Failed { cause },
                None => NavigationResult::Failed {
                    cause: format!("no scripted page for {url}"),
                },
            }
        }

        async fn snapshot(&mut self) -> Result<String, SessionError> {
            let (snapshots, index) = self.current.as_mut().ok_or(SessionError::NoPage)?;
            let html = snapshots
                .get(*index)
                .or_else(|| snapshots.last())
                .cloned()
                .ok_or(SessionError::NoPage)?;
            if *index + 1 < snapshots.len() {
                *index += 1;
            }
            Ok(html)
        }

        async fn close(self) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
