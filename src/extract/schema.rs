use std::sync::LazyLock;

use regex::Regex;

/// Every field a detail page can yield, besides the always-present href.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    UserEmail,
    UserName,
    VkId,
    Lesson,
    Module,
    Course,
    Level,
    Status,
    SubmissionTime,
    DeadlineTime,
    TestScore,
    SecondaryScore,
    CuratorScore,
    ResultScore,
}

/// Which element inside a field group a rule runs against.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// The group container itself.
    Group,
    /// The nth `<div>` inside the group, in document order.
    ChildDiv(usize),
}

#[derive(Debug)]
pub enum Rule {
    /// Capture group `group` of `re` against the element's collapsed text.
    Pattern { re: Regex, group: usize },
    /// The `value` attribute of the group's `input.form-control`.
    InputValue,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub field: Field,
    pub source: Source,
    pub rule: Rule,
}

#[derive(Debug)]
pub struct GroupSpec {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

fn pattern(field: Field, source: Source, re: &str, group: usize) -> FieldSpec {
    FieldSpec {
        field,
        source,
        rule: Rule::Pattern {
            re: Regex::new(re).expect("schema pattern is valid"),
            group,
        },
    }
}

/// The six labeled field groups of a detail page, in the order the backend
/// lays them out. Identity is positional, not semantic: if the backend ever
/// reorders the groups, this table is what changes, not the extraction code.
/// That layout dependency is a known fragility of the backend contract.
pub static SCHEMA: LazyLock<Vec<GroupSpec>> = LazyLock::new(|| {
    use Field::*;
    use Source::*;

    vec![
        GroupSpec {
            name: "user",
            fields: vec![
                pattern(UserEmail, Group, r"\S+@+\S+", 0),
                FieldSpec {
                    field: UserName,
                    source: Group,
                    rule: Rule::InputValue,
                },
                pattern(VkId, ChildDiv(1), r"(\d+)", 1),
            ],
        },
        GroupSpec {
            name: "homework",
            fields: vec![
                pattern(Lesson, ChildDiv(0), r"Урок:\s*(.*)", 1),
                pattern(Module, ChildDiv(1), r"Модуль:\s*(.*)", 1),
                pattern(Course, ChildDiv(2), r"Курс:\s*(.*)", 1),
                pattern(Level, ChildDiv(3), r"Сложность:\s*(.*)", 1),
            ],
        },
        GroupSpec {
            name: "status",
            fields: vec![pattern(Status, Group, r"Статус\s*(.*)", 1)],
        },
        GroupSpec {
            name: "timing",
            fields: vec![
                pattern(SubmissionTime, ChildDiv(0), r"\d+.\d+.\d+\s+\d+:\d+:\d+", 0),
                pattern(DeadlineTime, ChildDiv(2), r"\d+.\d+.\d+\s+\d+:\d+:\d+", 0),
            ],
        },
        GroupSpec {
            name: "scores",
            fields: vec![
                pattern(TestScore, ChildDiv(0), r"\d+", 0),
                pattern(SecondaryScore, ChildDiv(1), r"\d+", 0),
                pattern(CuratorScore, ChildDiv(2), r"\d+", 0),
            ],
        },
        GroupSpec {
            name: "result",
            fields: vec![pattern(ResultScore, ChildDiv(0), r"\d+%+\s+\d+/+\d+", 0)],
        },
    ]
});
