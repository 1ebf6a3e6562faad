//! Department vocabulary, ordering, and staging-sheet row lookup.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex_lite::Regex;

pub const SPECIAL_EVENTS: &str = "Special Events";
pub const CAST: &str = "Cast";
pub const BATCH: &str = "Batch";
pub const LAYOUT: &str = "Layout";
/// Grouping label for tasks with an empty department.
pub const OTHER: &str = "Other";

/// Display priority of the known departments.
pub const DEPARTMENT_ORDER: [&str; 13] = [
    SPECIAL_EVENTS,
    "Mill",
    "Form Out",
    CAST,
    BATCH,
    "Demold",
    LAYOUT,
    "Finish",
    "Seal",
    "Special",
    "Crating",
    "Load",
    "Ship",
];

/// Staging-sheet row for each `"<Department> <DayNumber>"` pair.
const STAGING_ROWS: &[(&str, u32)] = &[
    ("Mill 1", 5),
    ("Mill 2", 8),
    ("Mill 3", 11),
    ("Mill 4", 14),
    ("Form Out 1", 17),
    ("Form Out 2", 20),
    ("Form Out 3", 23),
    ("Form Out 4", 26),
    ("Cast 1", 29),
    ("Cast 2", 32),
    ("Demold 1", 37),
    ("Demold 2", 40),
    ("Demold 3", 43),
    ("Crating 1", 49),
    ("Crating 2", 52),
    ("Load 1", 55),
    ("Load 2", 58),
    ("Finish 1", 61),
    ("Finish 2", 64),
    ("Finish 3", 67),
    ("Finish 4", 70),
    ("Finish 5", 73),
    ("Seal 1", 76),
    ("Seal 2", 79),
    ("Seal 3", 82),
    ("Seal 4", 85),
    ("Special 1", 88),
    ("Special 2", 91),
    ("Special 3", 94),
    ("Special 4", 96),
    ("Special 5", 100),
    ("Ship 1", 102),
    ("Ship 2", 105),
];

/// Map a raw department string onto the fixed vocabulary.
///
/// Matching is case-insensitive on the trimmed value; `formout` is accepted
/// for Form Out. Unrecognized values are returned unchanged.
pub fn normalize_department(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return String::new();
    }
    if lowered == "formout" {
        return "Form Out".to_string();
    }
    DEPARTMENT_ORDER
        .iter()
        .find(|dept| dept.to_lowercase() == lowered)
        .map(|dept| dept.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Whether two department names refer to the same department, ignoring case.
pub fn same_department(a: &str, b: &str) -> bool {
    normalize_department(a)
        .trim()
        .eq_ignore_ascii_case(normalize_department(b).trim())
}

fn class_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("static pattern"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// CSS class fragment for a department (`Form Out` -> `form-out`).
pub fn department_class(dept: &str) -> String {
    let lowered = dept.to_lowercase();
    let dashed = whitespace_regex().replace_all(&lowered, "-");
    class_regex().replace_all(&dashed, "").into_owned()
}

/// Priority index of a known department.
pub fn department_rank(dept: &str) -> Option<usize> {
    DEPARTMENT_ORDER.iter().position(|d| *d == dept)
}

/// Known departments by priority, then unknown ones alphabetically.
pub fn compare_departments(a: &str, b: &str) -> Ordering {
    match (department_rank(a), department_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Whether the department is one of the synthetic look-ahead rows.
pub fn is_synthetic_department(dept: &str) -> bool {
    dept == BATCH || dept == LAYOUT
}

/// Staging-sheet row (1-based) for a department/day pair.
pub fn staging_row(department: &str, day_number: &str) -> Option<u32> {
    let key = format!("{} {}", department, day_number.trim());
    STAGING_ROWS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, row)| *row)
}
