use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth;
use crate::client::Backend;
use crate::config::AppConfig;
use crate::extract::{self, Record};
use crate::filters::{self, Dimension, OptionPicker, QueryFilter};
use crate::listing;
use crate::session::SessionStore;

const CHANNEL_DEPTH: usize = 64;

/// Everything a run produces: the collected records in completion order,
/// the resolved filter ids (they name the output artifact), and the skip
/// tallies the operator needs to judge data completeness.
pub struct ScrapeOutcome {
    pub records: Vec<Record>,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub pages_total: usize,
    pub pages_skipped: usize,
    pub links_total: usize,
    pub records_skipped: usize,
}

/// Drive the whole pipeline: authenticate, resolve filters, discover the
/// page count, fan out page fetches, fan out record extractions, collect.
/// Only authentication failure aborts; every lesser failure degrades to a
/// skipped unit and is tallied.
pub async fn run(
    backend: Arc<Backend>,
    store: &SessionStore,
    config: &AppConfig,
    picker: &mut dyn OptionPicker,
) -> Result<ScrapeOutcome> {
    let result = run_inner(backend, store, config, picker).await;
    // Cleanup runs on both paths; the shared connection context is dropped
    // exactly once, after every fan-out has drained.
    info!("session closed");
    result
}

async fn run_inner(
    backend: Arc<Backend>,
    store: &SessionStore,
    config: &AppConfig,
    picker: &mut dyn OptionPicker,
) -> Result<ScrapeOutcome> {
    auth::ensure_authenticated(backend.as_ref(), store, config).await?;

    // Dimensions narrow sequentially: the lesson options depend on the
    // module already chosen.
    let mut filter = QueryFilter::new(config.course_id, config.group_id);
    for dimension in [Dimension::Module, Dimension::Lesson] {
        let options = filters::fetch_filter_options(&backend, &filter, dimension).await;
        let id = filters::resolve_dimension(picker, dimension, &options);
        filter.set(dimension, id);
    }

    let page_count = listing::discover_page_count(&backend, &filter).await;
    let pages: Vec<u64> = page_numbers(page_count).collect();

    // Phase 1: one listing fetch per page, bounded by the shared limiter.
    let pb = progress_bar(pages.len() as u64, "Getting links")?;
    let (tx, mut rx) = mpsc::channel::<Option<Vec<String>>>(CHANNEL_DEPTH);
    for page in &pages {
        let backend = Arc::clone(&backend);
        let filter = filter.clone();
        let tx = tx.clone();
        let page = *page;
        tokio::spawn(async move {
            let links = listing::fetch_page(&backend, &filter, page).await;
            let _ = tx.send(links).await;
        });
    }
    drop(tx);

    let mut links: Vec<String> = Vec::new();
    let mut pages_skipped = 0usize;
    while let Some(result) = rx.recv().await {
        match result {
            Some(found) => links.extend(found),
            None => pages_skipped += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!("{} detail links collected from {} page(s)", links.len(), pages.len());

    // Phase 2: one detail fetch per link, same limiter, completion order.
    let pb = progress_bar(links.len() as u64, "Getting homeworks")?;
    let (tx, mut rx) = mpsc::channel::<Option<Record>>(CHANNEL_DEPTH);
    for (task_id, href) in links.iter().enumerate() {
        let backend = Arc::clone(&backend);
        let href = href.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let record = extract::fetch_record(&backend, task_id, &href).await;
            let _ = tx.send(record).await;
        });
    }
    drop(tx);

    let mut records: Vec<Record> = Vec::new();
    let mut records_skipped = 0usize;
    while let Some(result) = rx.recv().await {
        match result {
            Some(record) => records.push(record),
            None => records_skipped += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if pages_skipped > 0 || records_skipped > 0 {
        warn!(
            "skipped {} of {} page(s) and {} of {} record(s)",
            pages_skipped,
            pages.len(),
            records_skipped,
            links.len()
        );
    }

    Ok(ScrapeOutcome {
        records,
        module_id: filter.module_id,
        lesson_id: filter.lesson_id,
        pages_total: pages.len(),
        pages_skipped,
        links_total: links.len(),
        records_skipped,
    })
}

/// Listing pages to fetch for a discovered page count. The count is the
/// number of *full* pages, so one extra page picks up the remainder.
pub fn page_numbers(page_count: u64) -> std::ops::RangeInclusive<u64> {
    1..=page_count + 1
}

fn progress_bar(total: u64, msg: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    pb.set_message(msg);
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_two_records_spans_pages_one_through_three() {
        // 32 records / 15 per page -> count 2, fetched as pages 1..=3.
        let pages: Vec<u64> = page_numbers(listing::page_count_from_total(32)).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[test]
    fn progress_bar_template_parses() {
        assert!(progress_bar(3, "Getting links").is_ok());
    }

    #[test]
    fn zero_page_count_still_fetches_the_first_page() {
        let pages: Vec<u64> = page_numbers(0).collect();
        assert_eq!(pages, vec![1]);
    }

    /// Ten concurrent extractions, two failing, must still deliver the
    /// surviving eight with an accurate tally and no run-level failure.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn collector_keeps_partial_results() {
        let (tx, mut rx) = mpsc::channel::<Option<Record>>(4);

        for task_id in 0..10usize {
            let tx = tx.clone();
            tokio::spawn(async move {
                // Tasks 3 and 7 hit transport errors and yield nothing.
                let result = if task_id == 3 || task_id == 7 {
                    None
                } else {
                    Some(Record {
                        href: format!("https://api.100points.ru/student_homework/show/{task_id}"),
                        ..Record::default()
                    })
                };
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut records = Vec::new();
        let mut skipped = 0usize;
        while let Some(result) = rx.recv().await {
            match result {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }

        assert_eq!(records.len(), 8);
        assert_eq!(skipped, 2);
    }
}
