use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::CrawlSettings;
use crate::db::{Review, VehicleKey, VehicleSpec};
use crate::fetch::{FetchError, PageFetcher};
use crate::parser;

/// The ordered (model × year) work list: model outer, year inner, both in
/// configured order.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub models: Vec<String>,
    pub years: Vec<i32>,
    /// Skip every pair before this one.
    pub resume_from: Option<VehicleKey>,
}

impl CrawlPlan {
    pub fn new(models: Vec<String>, years: Vec<i32>) -> Self {
        Self {
            models,
            years,
            resume_from: None,
        }
    }

    pub fn from_settings(settings: &CrawlSettings) -> Self {
        Self::new(settings.models.clone(), settings.years.clone())
    }

    pub fn resume_from(mut self, key: Option<VehicleKey>) -> Self {
        self.resume_from = key;
        self
    }

    pub fn work_items(&self) -> Vec<VehicleKey> {
        let all = self
            .models
            .iter()
            .flat_map(|m| self.years.iter().map(move |y| VehicleKey::new(m.clone(), *y)));

        match &self.resume_from {
            None => all.collect(),
            Some(start) => {
                let items: Vec<VehicleKey> = all.collect();
                match items.iter().position(|k| k == start) {
                    Some(idx) => items[idx..].to_vec(),
                    None => {
                        warn!(resume_from = %start, "Resume point not in plan, crawling everything");
                        items
                    }
                }
            }
        }
    }
}

/// Parse a `MODEL:YEAR` resume point.
pub fn parse_resume_point(raw: &str) -> Result<VehicleKey, String> {
    let (model, year) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected MODEL:YEAR, got {raw:?}"))?;
    let model = model.trim();
    if model.is_empty() {
        return Err(format!("missing model in {raw:?}"));
    }
    let year = year
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("bad year in {raw:?}: {e}"))?;
    Ok(VehicleKey::new(model, year))
}

/// One kind of page to crawl per (model, year): where it lives and how to read it.
pub trait CrawlTarget {
    type Record: Clone + PartialEq;

    fn name(&self) -> &'static str;
    /// URL of result page `page` (1-based).
    fn page_url(&self, key: &VehicleKey, page: u32) -> String;
    fn max_pages(&self) -> u32;
    fn extract(&self, html: &str, key: &VehicleKey) -> Vec<Self::Record>;
}

/// Paginated consumer-review listings.
pub struct ReviewTarget {
    pub base_url: String,
    pub page_size: u32,
    pub max_pages: u32,
}

impl ReviewTarget {
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        Self {
            base_url: settings.review_base_url.trim_end_matches('/').to_string(),
            page_size: settings.page_size,
            max_pages: settings.max_pages.max(1),
        }
    }
}

impl CrawlTarget for ReviewTarget {
    type Record = Review;

    fn name(&self) -> &'static str {
        "reviews"
    }

    fn page_url(&self, key: &VehicleKey, page: u32) -> String {
        format!(
            "{}/{}/{}/consumer-reviews/?pagesize={}&pagenum={}",
            self.base_url, key.model, key.year, self.page_size, page
        )
    }

    fn max_pages(&self) -> u32 {
        self.max_pages
    }

    fn extract(&self, html: &str, key: &VehicleKey) -> Vec<Review> {
        parser::reviews::extract(html, key)
    }
}

/// One spec page per vehicle.
pub struct SpecTarget {
    pub base_url: String,
}

impl SpecTarget {
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        Self {
            base_url: settings.spec_base_url.clone(),
        }
    }
}

impl CrawlTarget for SpecTarget {
    type Record = VehicleSpec;

    fn name(&self) -> &'static str {
        "specs"
    }

    fn page_url(&self, key: &VehicleKey, _page: u32) -> String {
        format!("{}{}-{}/specs/", self.base_url, key.model, key.year)
    }

    fn max_pages(&self) -> u32 {
        1
    }

    fn extract(&self, html: &str, key: &VehicleKey) -> Vec<VehicleSpec> {
        parser::specs::extract(html, key)
    }
}

/// Result of a crawl. Records are in discovery order.
#[derive(Debug)]
pub struct CrawlOutcome<R> {
    pub records: Vec<R>,
    pub pairs: usize,
    pub pages: usize,
    pub failed: Vec<(VehicleKey, String)>,
}

/// Sequential crawler. Sleeps a fixed `delay` before every request except the first.
pub struct Crawler<'a> {
    fetcher: &'a dyn PageFetcher,
    delay: Duration,
    requests: usize,
}

impl<'a> Crawler<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, delay: Duration) -> Self {
        Self {
            fetcher,
            delay,
            requests: 0,
        }
    }

    pub async fn run<T: CrawlTarget>(&mut self, target: &T, plan: &CrawlPlan) -> CrawlOutcome<T::Record> {
        let items = plan.work_items();
        let pb = ProgressBar::new(items.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        let mut outcome = CrawlOutcome {
            records: Vec::new(),
            pairs: items.len(),
            pages: 0,
            failed: Vec::new(),
        };

        for key in items {
            pb.set_message(key.to_string());
            let (found, result) = self.crawl_pair(target, &key, &mut outcome.pages).await;
            let count = found.len();
            outcome.records.extend(found);

            if let Err(e) = result {
                warn!(kind = target.name(), vehicle = %key, kept = count, error = %e, "Crawl failed for vehicle, moving on");
                outcome.failed.push((key, e.to_string()));
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            kind = target.name(),
            pairs = outcome.pairs,
            pages = outcome.pages,
            records = outcome.records.len(),
            failed = outcome.failed.len(),
            "Crawl finished"
        );
        outcome
    }

    /// Walk result pages until one is empty, repeats the previous page, or the
    /// page limit is reached. Records from pages before a failure are returned.
    async fn crawl_pair<T: CrawlTarget>(
        &mut self,
        target: &T,
        key: &VehicleKey,
        pages: &mut usize,
    ) -> (Vec<T::Record>, Result<(), FetchError>) {
        let mut found = Vec::new();
        let mut previous: Option<Vec<T::Record>> = None;

        for page in 1..=target.max_pages() {
            let url = target.page_url(key, page);
            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(e) => return (found, Err(e)),
            };
            *pages += 1;

            let records = target.extract(&html, key);
            if records.is_empty() || previous.as_ref() == Some(&records) {
                break;
            }
            found.extend(records.iter().cloned());
            previous = Some(records);
        }

        (found, Ok(()))
    }

    async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        if self.requests > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.requests += 1;
        self.fetcher.fetch(url).await
    }
}
