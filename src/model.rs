// Task entity and the small pure helpers around it (sorting, smart input).
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Priority as the service stores it.
///
/// The service keeps priority as free text. Anything outside the three
/// known levels deserializes to `Unknown`, which ranks below `Low` when
/// sorting and is absent from every priority bucket.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

impl Priority {
    /// Sort rank, highest first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::Unknown => 0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// A task as the service returns it. The identifier is assigned by the
/// server and never changes; everything the store holds is a cached copy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    /// Case-insensitive substring match against title and description.
    pub fn matches(&self, query_lower: &str) -> bool {
        self.title.to_lowercase().contains(query_lower)
            || self
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(query_lower))
    }
}

/// Request body for create and full-replacement update. `None` fields are
/// omitted so the server applies its own defaults (priority medium,
/// completed false).
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Builds a draft from a single input line.
    ///
    /// Tokens starting with `!` set the priority (`!high`, `!m`, ...),
    /// tokens starting with `@` set the due date (`@2026-03-01`); every
    /// other token goes into the title. Unparsable markers stay in the
    /// title verbatim.
    pub fn from_smart_input(input: &str) -> Self {
        let mut draft = Self::default();
        let mut title_words = Vec::new();

        for word in input.split_whitespace() {
            if let Some(stripped) = word.strip_prefix('!')
                && let Ok(priority) = stripped.parse::<Priority>()
            {
                draft.priority = Some(priority);
                continue;
            }
            if let Some(stripped) = word.strip_prefix('@')
                && let Ok(date) = NaiveDate::parse_from_str(stripped, "%Y-%m-%d")
            {
                draft.due_date = Some(date);
                continue;
            }
            title_words.push(word);
        }

        draft.title = title_words.join(" ");
        draft
    }
}

/// Aggregate counters as served by `GET /stats`. Signed so transient
/// rollback arithmetic can never wrap.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
}

impl Stats {
    /// Holds in every settled state, except while a server-side search
    /// result is displayed (the counters keep describing the full table).
    pub fn is_consistent(&self) -> bool {
        self.total == self.completed + self.pending
    }
}

/// Client-side sort orders. All comparators are total; ties keep their
/// current relative order (stable sort).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Earliest due date first; tasks without one sort earliest.
    DateAsc,
    /// Reverse of `DateAsc`.
    DateDesc,
    /// High, then medium, then low; unrecognized priorities last.
    Priority,
    /// Case-insensitive title order.
    Title,
    /// Pending before completed.
    Status,
    /// Identifier descending, the server's baseline order.
    #[default]
    Default,
}

impl SortKey {
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        match self {
            SortKey::DateAsc => {
                let a_due = a.due_date.unwrap_or(NaiveDate::MIN);
                let b_due = b.due_date.unwrap_or(NaiveDate::MIN);
                a_due.cmp(&b_due)
            }
            SortKey::DateDesc => SortKey::DateAsc.compare(a, b).reverse(),
            SortKey::Priority => b.priority.rank().cmp(&a.priority.rank()),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::Status => a.completed.cmp(&b.completed),
            SortKey::Default => b.id.cmp(&a.id),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date-asc" => Ok(SortKey::DateAsc),
            "date-desc" => Ok(SortKey::DateDesc),
            "priority" => Ok(SortKey::Priority),
            "title" => Ok(SortKey::Title),
            "status" => Ok(SortKey::Status),
            "default" => Ok(SortKey::Default),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}
