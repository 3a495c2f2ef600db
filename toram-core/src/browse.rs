//! In-memory search, sorting and pagination over normalized listings.

use crate::models::{CompleteView, StatValue};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Number of page links shown around the current page.
const PAGE_WINDOW: usize = 5;

lazy_static! {
    static ref FIRST_NUMBER: Regex = Regex::new(r"-?\d+(\.\d+)?").unwrap();
    static ref ATK_LABELS: Vec<Regex> = vec![Regex::new(r"(?i)^(atk|attack|base atk|weapon atk)\b").unwrap()];
    static ref DEF_LABELS: Vec<Regex> = vec![Regex::new(r"(?i)^(def|defense)\b").unwrap()];
    static ref STABILITY_LABELS: Vec<Regex> = vec![
        Regex::new(r"(?i)^stability\b").unwrap(),
        Regex::new(r"(?i)^stab\b").unwrap(),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Type,
    AttributeCount,
    DropCount,
    UsageCount,
    Atk,
    Def,
    Stability,
}

impl SortKey {
    fn stat_labels(self) -> Option<&'static [Regex]> {
        match self {
            SortKey::Atk => Some(ATK_LABELS.as_slice()),
            SortKey::Def => Some(DEF_LABELS.as_slice()),
            SortKey::Stability => Some(STABILITY_LABELS.as_slice()),
            _ => None,
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "type" => Ok(SortKey::Type),
            "attributes" | "stats" => Ok(SortKey::AttributeCount),
            "drops" => Ok(SortKey::DropCount),
            "usage" => Ok(SortKey::UsageCount),
            "atk" => Ok(SortKey::Atk),
            "def" => Ok(SortKey::Def),
            "stability" => Ok(SortKey::Stability),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filters and ordering for one listing view. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    /// Case-insensitive substring of the name or type.
    pub search: Option<String>,
    pub item_type: Option<String>,
    /// Exact attribute label.
    pub stat: Option<String>,
    /// Exact usage type.
    pub usage_type: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
}

fn active(filter: &Option<String>) -> Option<&str> {
    filter.as_deref().filter(|f| !f.is_empty())
}

impl ItemQuery {
    pub fn matches(&self, view: &CompleteView) -> bool {
        if let Some(term) = active(&self.search) {
            let term = term.to_lowercase();
            let hit = view.item.name.to_lowercase().contains(&term)
                || view.item.item_type.to_lowercase().contains(&term);
            if !hit {
                return false;
            }
        }
        if let Some(item_type) = active(&self.item_type) {
            if view.item.item_type != item_type {
                return false;
            }
        }
        if let Some(stat) = active(&self.stat) {
            if !view.attributes.iter().any(|a| a.label == stat) {
                return false;
            }
        }
        if let Some(usage_type) = active(&self.usage_type) {
            if !view.usage().iter().any(|u| u.usage_type == usage_type) {
                return false;
            }
        }
        true
    }

    /// Matching views, stably sorted.
    pub fn apply<'a>(&self, views: &'a [CompleteView]) -> Vec<&'a CompleteView> {
        let mut matched: Vec<&CompleteView> = views.iter().filter(|v| self.matches(v)).collect();

        match self.sort.stat_labels() {
            Some(labels) => matched.sort_by(|a, b| {
                compare_missing_last(stat_value(a, labels), stat_value(b, labels), self.order)
            }),
            None => matched.sort_by(|a, b| {
                let cmp = compare_by(a, b, self.sort);
                match self.order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                }
            }),
        }

        matched
    }
}

/// Case-insensitive text order with a byte-wise tiebreak.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

fn compare_by(a: &CompleteView, b: &CompleteView, key: SortKey) -> Ordering {
    match key {
        SortKey::Type => compare_text(&a.item.item_type, &b.item.item_type),
        SortKey::AttributeCount => a.attributes.len().cmp(&b.attributes.len()),
        SortKey::DropCount => a.drops.len().cmp(&b.drops.len()),
        SortKey::UsageCount => a.usage().len().cmp(&b.usage().len()),
        _ => compare_text(&a.item.name, &b.item.name),
    }
}

/// Items without a value go last whatever the direction.
fn compare_missing_last(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let cmp = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            }
        }
    }
}

/// First number in a stat value: `"+12%"` -> 12.
pub fn read_numeric(value: &StatValue) -> Option<f64> {
    match value {
        StatValue::Text(text) => FIRST_NUMBER.find(text).and_then(|m| m.as_str().parse().ok()),
        other => other.as_f64(),
    }
}

/// Numeric value of the first attribute whose label matches one of `labels`.
fn stat_value(view: &CompleteView, labels: &[Regex]) -> Option<f64> {
    view.attributes
        .iter()
        .filter(|a| labels.iter().any(|re| re.is_match(&a.label)))
        .find_map(|a| read_numeric(&a.value))
}

/// Distinct filter values present in a listing, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Facets {
    pub types: Vec<String>,
    pub stats: Vec<String>,
    pub usage_types: Vec<String>,
}

impl Facets {
    pub fn collect(views: &[CompleteView]) -> Self {
        fn sorted<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
            values
                .filter(|v| !v.is_empty())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }

        Self {
            types: sorted(views.iter().map(|v| &v.item.item_type)),
            stats: sorted(views.iter().flat_map(|v| v.attributes.iter().map(|a| &a.label))),
            usage_types: sorted(views.iter().flat_map(|v| v.usage().iter().map(|u| &u.usage_type))),
        }
    }
}

/// One page of a result list. Pages are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    /// Index of the first item on this page.
    pub start: usize,
    /// One past the last item on this page.
    pub end: usize,
}

impl<T> Page<'_, T> {
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn window(&self) -> Vec<usize> {
        page_window(self.page, self.total_pages)
    }
}

/// Slice out `page` of `items`; out-of-range pages are clamped.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let page = page.clamp(1, total_pages.max(1));
    let start = ((page - 1) * page_size).min(total_items);
    let end = (start + page_size).min(total_items);

    Page {
        items: &items[start..end],
        page,
        total_pages,
        total_items,
        start,
        end,
    }
}

/// Up to five page numbers to link, keeping `current` centred where possible.
pub fn page_window(current: usize, total_pages: usize) -> Vec<usize> {
    let count = total_pages.min(PAGE_WINDOW);
    let first = if total_pages <= PAGE_WINDOW || current <= 3 {
        1
    } else if current + 2 >= total_pages {
        total_pages - (PAGE_WINDOW - 1)
    } else {
        current - 2
    };
    (first..first + count).collect()
}
