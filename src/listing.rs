use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{error, info, warn};

use crate::client::Backend;
use crate::filters::QueryFilter;

pub const LISTING_PATH: &str = "/student_homework/index";

/// Records per listing page, fixed by the backend's DataTables setup.
pub const PAGE_SIZE: u64 = 15;

/// The summary line reads "Показано с 1 по 15 из 32 записей" or similar; the
/// total is whatever integer trails the string.
static TRAILING_INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*$").unwrap());

static SUMMARY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#example2_info").unwrap());

/// Detail links live in anchor cells of the listing table's odd-striped rows.
static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#example2_wrapper tbody tr.odd a[href]").unwrap());

/// Ask the listing for its total record count and derive the page count.
/// A missing or unparsable summary is logged and becomes 0 pages: the run
/// proceeds and simply fetches nothing.
pub async fn discover_page_count(backend: &Backend, filter: &QueryFilter) -> u64 {
    let page = match backend.get(LISTING_PATH, &filter.to_query()).await {
        Ok(page) => page,
        Err(err) => {
            error!("page count request failed: {err}");
            return 0;
        }
    };
    info!("listing query resolved to {}", page.url);

    match parse_total_records(&page.body) {
        Some(total) => {
            let pages = page_count_from_total(total);
            info!("{total} records reported, expecting {pages} full page(s)");
            pages
        }
        None => {
            error!("pagination summary not found on {}", page.url);
            0
        }
    }
}

/// Pull the trailing integer out of the `example2_info` summary element.
pub fn parse_total_records(html: &str) -> Option<u64> {
    let doc = Html::parse_document(html);
    let summary = doc.select(&SUMMARY_SELECTOR).next()?;
    let text: String = summary.text().collect::<Vec<_>>().join(" ");
    TRAILING_INT_RE
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

pub fn page_count_from_total(total: u64) -> u64 {
    total / PAGE_SIZE
}

/// Fetch one listing page and return the detail links it holds.
///
/// `None` covers both failure modes: a transport error (logged with the page
/// number) and a page with no matching anchors (expected past the last valid
/// page, logged as a warning). Neither is retried and neither aborts the run.
pub async fn fetch_page(
    backend: &Backend,
    filter: &QueryFilter,
    page_number: u64,
) -> Option<Vec<String>> {
    let query = filter.with_page(page_number as usize);
    let page = match backend.get(LISTING_PATH, &query).await {
        Ok(page) => page,
        Err(err) => {
            error!("page {page_number} skipped: {err}");
            return None;
        }
    };

    let links = parse_listing_links(&page.body);
    if links.is_none() {
        warn!("no detail links on page {page_number}, check {}", page.url);
    }
    links
}

/// Extract the detail links of one listing page; `None` when there are none.
pub fn parse_listing_links(html: &str) -> Option<Vec<String>> {
    let doc = Html::parse_document(html);
    let links: Vec<String> = doc
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect();

    if links.is_empty() {
        None
    } else {
        Some(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_html(info: &str, rows: &str) -> String {
        format!(
            r#"<div id="example2_wrapper">
                 <table><tbody>{rows}</tbody></table>
                 <div class="dataTables_info" id="example2_info">{info}</div>
               </div>"#
        )
    }

    #[test]
    fn total_is_the_trailing_integer_of_the_summary() {
        let html = listing_html("Показано с 1 по 15 из 32", "");
        assert_eq!(parse_total_records(&html), Some(32));
    }

    #[test]
    fn thirty_two_records_means_two_full_pages() {
        // 32 records at 15 per page: two full pages, remainder on a third.
        assert_eq!(page_count_from_total(32), 2);
        assert_eq!(page_count_from_total(14), 0);
        assert_eq!(page_count_from_total(15), 1);
        assert_eq!(page_count_from_total(0), 0);
    }

    #[test]
    fn missing_summary_yields_none() {
        assert_eq!(parse_total_records("<div>no summary here</div>"), None);
    }

    #[test]
    fn summary_without_trailing_number_yields_none() {
        let html = listing_html("записей не найдено", "");
        assert_eq!(parse_total_records(&html), None);
    }

    #[test]
    fn links_come_from_odd_rows_only() {
        let rows = r#"
            <tr class="odd"><td><a href="https://api.100points.ru/student_homework/show/1">1</a></td></tr>
            <tr class="even"><td><a href="https://api.100points.ru/student_homework/show/2">2</a></td></tr>
            <tr class="odd"><td><a href="https://api.100points.ru/student_homework/show/3">3</a></td></tr>"#;
        let html = listing_html("", rows);
        let links = parse_listing_links(&html).unwrap();
        assert_eq!(
            links,
            vec![
                "https://api.100points.ru/student_homework/show/1",
                "https://api.100points.ru/student_homework/show/3",
            ]
        );
    }

    #[test]
    fn page_with_no_anchors_is_none_not_empty() {
        let html = listing_html("", "<tr class=\"odd\"><td>no link</td></tr>");
        assert_eq!(parse_listing_links(&html), None);
    }
}
