use std::io::{self, Write};
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{error, warn};

use crate::client::Backend;
use crate::listing::LISTING_PATH;
use crate::retry;

const FETCH_ATTEMPTS: u32 = 5;
const FETCH_BACKOFF: Duration = Duration::from_millis(500);

/// A filter axis advertised by the listing page's selector controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Module,
    Lesson,
}

impl Dimension {
    /// Query parameter name, which doubles as the select element's id.
    pub fn param(self) -> &'static str {
        match self {
            Dimension::Module => "module_id",
            Dimension::Lesson => "lesson_id",
        }
    }
}

/// One option of a selector control. `id: None` is the backend's own
/// "all" entry (an option with an empty value attribute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOption {
    pub id: Option<i64>,
    pub label: Option<String>,
}

/// The narrowing applied to every listing request. Resolved once, before any
/// page fetch, and immutable afterwards.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub course_id: i64,
    pub group_id: i64,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
}

impl QueryFilter {
    pub fn new(course_id: i64, group_id: i64) -> Self {
        Self {
            course_id,
            group_id,
            module_id: None,
            lesson_id: None,
        }
    }

    pub fn set(&mut self, dimension: Dimension, id: Option<i64>) {
        match dimension {
            Dimension::Module => self.module_id = id,
            Dimension::Lesson => self.lesson_id = id,
        }
    }

    /// Query pairs for a listing request. Only the "passed" status is ever
    /// scraped; unrestricted dimensions are simply omitted.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("status".to_string(), "passed".to_string()),
            ("course_id".to_string(), self.course_id.to_string()),
            ("group_id".to_string(), self.group_id.to_string()),
        ];
        if let Some(id) = self.module_id {
            query.push(("module_id".to_string(), id.to_string()));
        }
        if let Some(id) = self.lesson_id {
            query.push(("lesson_id".to_string(), id.to_string()));
        }
        query
    }

    pub fn with_page(&self, page: usize) -> Vec<(String, String)> {
        let mut query = self.to_query();
        query.push(("page".to_string(), page.to_string()));
        query
    }
}

/// Chooses one option for a dimension. Injected so the core never talks to a
/// terminal directly; tests supply a scripted picker.
pub trait OptionPicker {
    /// Return a candidate id, or `None` for "no restriction". Membership is
    /// validated by the resolver, which asks again on a bad candidate.
    fn pick(&mut self, dimension: Dimension, options: &[FilterOption]) -> Option<i64>;
}

/// Fetch the advertised options for one dimension. Transport trouble is
/// retried a few times, then degrades to an empty set: the run continues
/// with no narrowing possible on this axis.
pub async fn fetch_filter_options(
    backend: &Backend,
    filter: &QueryFilter,
    dimension: Dimension,
) -> Vec<FilterOption> {
    let query = filter.to_query();
    let fetched = retry::with_retries(FETCH_ATTEMPTS, FETCH_BACKOFF, || async {
        let page = backend.get(LISTING_PATH, &query).await?;
        if !page.is_success() {
            anyhow::bail!("status {} for {}", page.status, page.url);
        }
        Ok(page)
    })
    .await;

    match fetched {
        Ok(page) => {
            let options = parse_filter_options(&page.body, dimension);
            if options.is_empty() {
                error!("no {} options found on the listing page", dimension.param());
            }
            options
        }
        Err(err) => {
            error!(
                "giving up on {} options after {} attempts: {}",
                dimension.param(),
                FETCH_ATTEMPTS,
                err
            );
            Vec::new()
        }
    }
}

/// Parse the `<select>` control for a dimension into its option set.
pub fn parse_filter_options(html: &str, dimension: Dimension) -> Vec<FilterOption> {
    let selector = Selector::parse(&format!("select.form-control#{} option", dimension.param()))
        .expect("option selector is valid");
    let doc = Html::parse_document(html);

    doc.select(&selector)
        .map(|option| {
            let id = option
                .value()
                .attr("value")
                .filter(|v| !v.is_empty())
                .and_then(|v| v.parse::<i64>().ok());
            let label = {
                let text: Vec<_> = option.text().map(str::trim).filter(|t| !t.is_empty()).collect();
                if text.is_empty() {
                    None
                } else {
                    Some(text.join(" "))
                }
            };
            FilterOption { id, label }
        })
        .collect()
}

/// Drive the picker until it produces a valid choice: either an id that the
/// backend actually advertised, or `None` for "all".
pub fn resolve_dimension(
    picker: &mut dyn OptionPicker,
    dimension: Dimension,
    options: &[FilterOption],
) -> Option<i64> {
    let available: Vec<i64> = options.iter().filter_map(|o| o.id).collect();

    loop {
        match picker.pick(dimension, options) {
            None => return None,
            Some(id) if available.contains(&id) => return Some(id),
            Some(id) => {
                warn!("{} is not an advertised {} id", id, dimension.param());
            }
        }
    }
}

/// Interactive picker: lists the options and reads an id from stdin. An
/// empty line selects everything.
#[derive(Default)]
pub struct TerminalPicker;

impl OptionPicker for TerminalPicker {
    fn pick(&mut self, dimension: Dimension, options: &[FilterOption]) -> Option<i64> {
        let mut available: Vec<i64> = options.iter().filter_map(|o| o.id).collect();
        available.sort_unstable();

        println!();
        for option in options {
            if let Some(id) = option.id {
                println!("{:>6} -- {}", id, option.label.as_deref().unwrap_or("?"));
            }
        }
        println!(
            "Available {} ids: {}",
            dimension.param(),
            available
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );
        loop {
            print!("Enter an id (or leave empty to select all): ");
            let _ = io::stdout().flush();

            let mut line = String::new();
            if io::stdin().read_line(&mut line).is_err() {
                return None;
            }
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match line.parse::<i64>() {
                Ok(id) => return Some(id),
                Err(_) => eprintln!("'{line}' is not a number"),
            }
        }
    }
}
