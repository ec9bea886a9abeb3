//! Domain-locked, depth-bounded crawler.
//!
//! A run is `seed → enqueue → {visit → discover → enqueue unseen} → drain`.
//! The seed is visited inline so that a failure to reach it can be returned
//! to the caller; every later page is fetched by a bounded set of worker
//! tasks fed from a FIFO frontier.
//!
//! Each visit is an explicit pipeline: `fetch → parse → extract → Plan`.
//! A page with a table hands its plan to the [`EnrichmentPool`] and crawling
//! continues without waiting for the classifier.

mod fetch;
mod scope;

pub use fetch::{FetchedPage, Fetcher, HttpFetcher};
pub use scope::UrlScope;

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::aggregator::send_or_cancel;
use crate::config::CrawlConfig;
use crate::enricher::EnrichmentPool;
use crate::error::{CrawlError, CrawlResult, PageFailure};
use crate::extractor;
use crate::types::plan::Plan;
use crate::visited::VisitedSet;

/// Everything a crawl run shares with the rest of the pipeline.
pub struct CrawlRun {
    /// Seeded with history; also used for discovery-time dedup
    pub visited: Arc<VisitedSet>,
    pub enrichment: EnrichmentPool,
    pub errors: mpsc::Sender<PageFailure>,
    pub cancel: CancellationToken,
}

/// Counters for one crawl run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Pages fetched successfully, seed included
    pub pages_visited: usize,
    pub pages_failed: usize,
    /// Pages that contained a table and were sent to enrichment
    pub plans_found: usize,
}

/// Crawler bound to one allowed domain.
pub struct Crawler<F> {
    fetcher: Arc<F>,
    scope: UrlScope,
    config: CrawlConfig,
}

impl<F: Fetcher + 'static> Crawler<F> {
    pub fn new(fetcher: F, config: CrawlConfig) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            scope: UrlScope::new(config.allowed_domain.clone()),
            config,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawl from `seed` until the frontier is empty or the run is cancelled.
    ///
    /// Only the seed can fail the run: an invalid or out-of-scope seed, or a
    /// seed that cannot be fetched. Every other page failure is sent on
    /// `run.errors` and counted.
    #[instrument(skip(self, run), fields(domain = %self.scope.domain()))]
    pub async fn run(&self, seed: &str, run: CrawlRun) -> CrawlResult<CrawlStats> {
        let seed = self.scope.check_seed(seed)?;
        let mut stats = CrawlStats::default();

        // The seed is the explicit trigger, so history never suppresses it
        run.visited.add(seed.as_str());

        let visitor = Arc::new(Visitor {
            fetcher: self.fetcher.clone(),
            scope: self.scope.clone(),
            visited: run.visited.clone(),
            enrichment: run.enrichment.clone(),
            max_depth: self.config.max_depth,
        });

        let seed_visit = tokio::select! {
            _ = run.cancel.cancelled() => return Ok(stats),
            visit = visitor.visit(&seed, 0) => visit?,
        };
        stats.record(&seed_visit);

        let mut frontier: VecDeque<(Url, usize)> =
            seed_visit.links.into_iter().map(|url| (url, 1)).collect();
        let mut in_flight = JoinSet::new();

        loop {
            while in_flight.len() < self.config.parallelism {
                let Some((url, depth)) = frontier.pop_front() else {
                    break;
                };
                let visitor = visitor.clone();
                in_flight.spawn(async move {
                    let result = visitor.visit(&url, depth).await;
                    (url, depth, result)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = run.cancel.cancelled() => {
                    debug!(in_flight = in_flight.len(), queued = frontier.len(), "Crawl cancelled");
                    in_flight.abort_all();
                    break;
                }
                joined = in_flight.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((_, depth, Ok(visit))) => {
                            stats.record(&visit);
                            frontier.extend(visit.links.into_iter().map(|url| (url, depth + 1)));
                        }
                        Ok((url, depth, Err(e))) => {
                            warn!(url = %url, depth, error = %e, "Failed to visit page");
                            stats.pages_failed += 1;
                            let failure = PageFailure::Fetch {
                                url: url.to_string(),
                                source: e,
                            };
                            send_or_cancel(&run.errors, &run.cancel, failure).await;
                        }
                        Err(e) if e.is_panic() => {
                            warn!(error = %e, "Crawl worker panicked");
                            stats.pages_failed += 1;
                        }
                        Err(_) => {}
                    }
                }
            }
        }

        info!(
            pages_visited = stats.pages_visited,
            pages_failed = stats.pages_failed,
            plans_found = stats.plans_found,
            visited_urls = run.visited.size(),
            "Crawl finished"
        );
        Ok(stats)
    }
}

impl CrawlStats {
    fn record(&mut self, visit: &Visit) {
        self.pages_visited += 1;
        if visit.plan_found {
            self.plans_found += 1;
        }
    }
}

/// Outcome of a successful page visit.
struct Visit {
    /// Newly discovered in-scope URLs, already marked as visited
    links: Vec<Url>,
    plan_found: bool,
}

/// Per-run state shared by the worker tasks.
struct Visitor<F> {
    fetcher: Arc<F>,
    scope: UrlScope,
    visited: Arc<VisitedSet>,
    enrichment: EnrichmentPool,
    max_depth: usize,
}

impl<F: Fetcher> Visitor<F> {
    async fn visit(&self, url: &Url, depth: usize) -> CrawlResult<Visit> {
        debug!(url = %url, depth, "Visiting page");
        let page = self.fetcher.fetch(url).await?;
        if page.url != *url {
            if !self.scope.allows(&page.url) {
                return Err(CrawlError::OutOfScope {
                    url: page.url.to_string(),
                    domain: self.scope.domain().to_string(),
                });
            }
            self.visited.add(page.url.as_str());
        }

        let parsed = extractor::parse_page(&page.html);

        let plan_found = match parsed.extracted {
            Some(extracted) => {
                let plan = Plan::new(
                    url.as_str(),
                    extracted.title,
                    extracted.description,
                    extracted.table,
                );
                debug!(url = %url, rows = plan.table.len(), "Plan extracted");
                self.enrichment.spawn(plan);
                true
            }
            None => false,
        };

        let links = if depth < self.max_depth {
            self.discover(&page.url, &parsed.hrefs)
        } else {
            Vec::new()
        };

        Ok(Visit { links, plan_found })
    }

    /// Resolve hrefs against `base` and keep the in-scope ones nobody has claimed yet.
    fn discover(&self, base: &Url, hrefs: &[String]) -> Vec<Url> {
        hrefs
            .iter()
            .filter_map(|href| self.scope.resolve(base, href))
            .filter(|url| self.visited.insert(url.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClassifier, MockFetcher};
    use crate::types::document::Document;
    use std::time::Duration;
    use tokio_util::task::TaskTracker;

    const PLAN_PAGE: &str = r#"<html><body><h1>Plan</h1><table>
        <tr><td>2</td><td>x</td><td>100</td><td></td><td>Kraul</td><td></td><td>200</td></tr>
        </table></body></html>"#;

    struct Harness {
        run: CrawlRun,
        documents: mpsc::Receiver<Document>,
        errors: mpsc::Receiver<PageFailure>,
        tracker: TaskTracker,
    }

    fn harness(visited: VisitedSet) -> Harness {
        let (doc_tx, documents) = mpsc::channel(64);
        let (err_tx, errors) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let enrichment = EnrichmentPool::new(
            Arc::new(MockClassifier::new()),
            tracker.clone(),
            4,
            doc_tx,
            err_tx.clone(),
            cancel.clone(),
        );
        Harness {
            run: CrawlRun {
                visited: Arc::new(visited),
                enrichment,
                errors: err_tx,
                cancel,
            },
            documents,
            errors,
            tracker,
        }
    }

    fn config(max_depth: usize) -> CrawlConfig {
        CrawlConfig::new("swim.example")
            .with_max_depth(max_depth)
            .with_parallelism(2)
    }

    #[tokio::test]
    async fn test_follows_links_within_depth() {
        let fetcher = MockFetcher::new()
            .with_page(
                "https://swim.example/",
                r#"<a href="/a">a</a><a href="/b#x">b</a><a href="https://other.example/">o</a>"#,
            )
            .with_page("https://swim.example/a", r#"<a href="/deep">deep</a>"#)
            .with_page("https://swim.example/b", PLAN_PAGE)
            .with_page("https://swim.example/deep", PLAN_PAGE);
        let crawler = Crawler::new(fetcher, config(1));

        let mut h = harness(VisitedSet::new());
        let visited = h.run.visited.clone();
        let stats = crawler.run("https://swim.example/", h.run).await.unwrap();
        h.tracker.close();
        h.tracker.wait().await;

        assert_eq!(stats.pages_visited, 3);
        assert_eq!(stats.plans_found, 1);
        assert!(!visited.contains("https://swim.example/deep"));
        assert!(!visited.contains("https://other.example/"));

        let doc = h.documents.recv().await.unwrap();
        assert_eq!(doc.plan.url, "https://swim.example/b");
        assert!(h.errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_history_suppresses_links_but_not_seed() {
        let fetcher = MockFetcher::new()
            .with_page("https://swim.example/", r#"<a href="/old">old</a><a href="/new">new</a>"#)
            .with_page("https://swim.example/old", PLAN_PAGE)
            .with_page("https://swim.example/new", PLAN_PAGE);
        let fetcher = Arc::new(fetcher);
        let crawler = Crawler::new(fetcher.clone(), config(2));

        let history: VisitedSet = ["https://swim.example/", "https://swim.example/old"]
            .into_iter()
            .collect();
        let h = harness(history);
        let stats = crawler.run("https://swim.example/", h.run).await.unwrap();

        assert_eq!(stats.pages_visited, 2);
        assert_eq!(
            fetcher.calls(),
            vec!["https://swim.example/", "https://swim.example/new"]
        );
    }

    #[tokio::test]
    async fn test_page_failure_is_reported_not_escalated() {
        let fetcher = MockFetcher::new()
            .with_page("https://swim.example/", r#"<a href="/missing">m</a>"#);
        let crawler = Crawler::new(fetcher, config(1));

        let mut h = harness(VisitedSet::new());
        let stats = crawler.run("https://swim.example/", h.run).await.unwrap();

        assert_eq!(stats.pages_failed, 1);
        let failure = h.errors.recv().await.unwrap();
        assert_eq!(failure.url(), "https://swim.example/missing");
    }

    #[tokio::test]
    async fn test_seed_failures_escalate() {
        let crawler = Crawler::new(MockFetcher::new(), config(1));

        let h = harness(VisitedSet::new());
        let err = crawler.run("https://swim.example/", h.run).await.unwrap_err();
        assert!(matches!(err, crate::error::CrawlError::Status { status: 404, .. }));

        let h = harness(VisitedSet::new());
        let err = crawler.run("https://elsewhere.example/", h.run).await.unwrap_err();
        assert!(matches!(err, crate::error::CrawlError::OutOfScope { .. }));
    }

    #[tokio::test]
    async fn test_redirect_off_domain_is_a_page_failure() {
        let fetcher = MockFetcher::new()
            .with_page("https://swim.example/", r#"<a href="/p">p</a><a href="/q">q</a>"#)
            .with_redirect("https://swim.example/p", "https://other.example/plan")
            .with_page("https://other.example/plan", PLAN_PAGE)
            .with_redirect("https://swim.example/q", "https://www.swim.example/q")
            .with_page("https://www.swim.example/q", PLAN_PAGE);
        let crawler = Crawler::new(fetcher, config(1));

        let mut h = harness(VisitedSet::new());
        let visited = h.run.visited.clone();
        let stats = crawler.run("https://swim.example/", h.run).await.unwrap();
        h.tracker.close();
        h.tracker.wait().await;

        assert_eq!(stats.pages_visited, 2);
        assert_eq!(stats.pages_failed, 1);
        assert_eq!(stats.plans_found, 1);
        assert!(!visited.contains("https://other.example/plan"));
        assert!(visited.contains("https://www.swim.example/q"));

        let failure = h.errors.recv().await.unwrap();
        assert_eq!(failure.url(), "https://swim.example/p");
        assert!(matches!(
            failure,
            PageFailure::Fetch { source: CrawlError::OutOfScope { .. }, .. }
        ));

        let doc = h.documents.recv().await.unwrap();
        assert_eq!(doc.plan.url, "https://swim.example/q");
        assert!(h.documents.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fetches_bounded_by_parallelism() {
        let mut fetcher = MockFetcher::new().with_delay(Duration::from_millis(20));
        let mut index = String::new();
        for i in 0..20 {
            index.push_str(&format!(r#"<a href="/plan/{i}">{i}</a>"#));
            fetcher = fetcher.with_page(&format!("https://swim.example/plan/{i}"), "<p>leer</p>");
        }
        let fetcher = Arc::new(fetcher.with_page("https://swim.example/", index));
        let crawler = Crawler::new(fetcher.clone(), config(1).with_parallelism(3));

        let h = harness(VisitedSet::new());
        let stats = crawler.run("https://swim.example/", h.run).await.unwrap();

        assert_eq!(stats.pages_visited, 21);
        assert_eq!(fetcher.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_links_fetched_once() {
        let fetcher = MockFetcher::new()
            .with_page("https://swim.example/", r#"<a href="/a">a</a><a href="/b">b</a>"#)
            .with_page("https://swim.example/a", r#"<a href="/shared">s</a>"#)
            .with_page("https://swim.example/b", r#"<a href="/shared">s</a><a href="/">home</a>"#)
            .with_page("https://swim.example/shared", "<p>nothing</p>");
        let fetcher = Arc::new(fetcher);
        let crawler = Crawler::new(fetcher.clone(), config(3));

        let h = harness(VisitedSet::new());
        let stats = crawler.run("https://swim.example/", h.run).await.unwrap();

        assert_eq!(stats.pages_visited, 4);
        let shared = fetcher
            .calls()
            .iter()
            .filter(|u| u.as_str() == "https://swim.example/shared")
            .count();
        assert_eq!(shared, 1);
    }
}
