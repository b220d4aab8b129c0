pub mod schema;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::client::Backend;
use self::schema::{Field, FieldSpec, Rule, Source, SCHEMA};

/// The field groups sit inside the detail card, three columns to a row.
static GROUP_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.card-body div.row div.form-group.col-md-3").unwrap());

static DIV_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());

static INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input.form-control").unwrap());

/// One extracted homework. `href` is the fetch key and always present; every
/// other field is `None` whenever its markup element or pattern is missing,
/// which is an encoded outcome rather than an error.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub href: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub vk_id: Option<String>,
    pub lesson: Option<String>,
    pub module: Option<String>,
    pub course: Option<String>,
    pub level: Option<String>,
    pub status: Option<String>,
    pub submission_time: Option<String>,
    pub deadline_time: Option<String>,
    pub test_score: Option<String>,
    pub secondary_score: Option<String>,
    pub curator_score: Option<String>,
    pub result_score: Option<String>,
}

impl Record {
    pub const FIELD_NAMES: [&'static str; 15] = [
        "href",
        "user_email",
        "user_name",
        "vk_id",
        "lesson",
        "module",
        "course",
        "level",
        "status",
        "submission_time",
        "deadline_time",
        "test_score",
        "secondary_score",
        "curator_score",
        "result_score",
    ];

    fn set(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::UserEmail => &mut self.user_email,
            Field::UserName => &mut self.user_name,
            Field::VkId => &mut self.vk_id,
            Field::Lesson => &mut self.lesson,
            Field::Module => &mut self.module,
            Field::Course => &mut self.course,
            Field::Level => &mut self.level,
            Field::Status => &mut self.status,
            Field::SubmissionTime => &mut self.submission_time,
            Field::DeadlineTime => &mut self.deadline_time,
            Field::TestScore => &mut self.test_score,
            Field::SecondaryScore => &mut self.secondary_score,
            Field::CuratorScore => &mut self.curator_score,
            Field::ResultScore => &mut self.result_score,
        };
        *slot = value;
    }

    /// Row values in `FIELD_NAMES` order, absent fields as empty strings.
    pub fn row(&self) -> [&str; 15] {
        fn opt(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("")
        }
        [
            self.href.as_str(),
            opt(&self.user_email),
            opt(&self.user_name),
            opt(&self.vk_id),
            opt(&self.lesson),
            opt(&self.module),
            opt(&self.course),
            opt(&self.level),
            opt(&self.status),
            opt(&self.submission_time),
            opt(&self.deadline_time),
            opt(&self.test_score),
            opt(&self.secondary_score),
            opt(&self.curator_score),
            opt(&self.result_score),
        ]
    }
}

/// Fetch one detail page and extract it. Transport failure skips the record
/// (logged with the sequential task id), it is never retried and never
/// aborts the run.
pub async fn fetch_record(backend: &Backend, task_id: usize, href: &str) -> Option<Record> {
    match backend.get_href(href).await {
        Ok(page) => Some(parse_record(&page.body, href)),
        Err(err) => {
            warn!("task {task_id} skipped ({href}): {err}");
            None
        }
    }
}

/// Apply the declarative schema to a detail page. Groups are matched by
/// position; a missing group leaves exactly its own fields unset.
pub fn parse_record(html: &str, href: &str) -> Record {
    let doc = Html::parse_document(html);
    let groups: Vec<ElementRef> = doc.select(&GROUP_SELECTOR).collect();

    let mut record = Record {
        href: href.to_string(),
        ..Record::default()
    };

    for (index, group_spec) in SCHEMA.iter().enumerate() {
        let Some(group) = groups.get(index).copied() else {
            debug!("group '{}' (#{index}) missing on {href}", group_spec.name);
            continue;
        };
        let children: Vec<ElementRef> = group.select(&DIV_SELECTOR).collect();
        for spec in &group_spec.fields {
            record.set(spec.field, apply_rule(spec, group, &children));
        }
    }

    record
}

fn apply_rule(spec: &FieldSpec, group: ElementRef, children: &[ElementRef]) -> Option<String> {
    let element = match spec.source {
        Source::Group => Some(group),
        Source::ChildDiv(n) => children.get(n).copied(),
    }?;

    match &spec.rule {
        Rule::InputValue => element
            .select(&INPUT_SELECTOR)
            .next()?
            .value()
            .attr("value")
            .map(str::to_string),
        Rule::Pattern { re, group } => {
            let text = normalized_text(element);
            re.captures(&text)?
                .get(*group)
                .map(|m| m.as_str().trim().to_string())
        }
    }
}

/// Element text, one trimmed line per source line. The backend renders one
/// field per line, so an open-ended `(.*)` capture must stop at the line
/// break instead of swallowing the rest of the group.
fn normalized_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
