/// Item ordering and section grouping for the grid
///
/// Sorting decides the authoritative order (the one cached for prev/next
/// navigation). Grouping is presentation only: it splits an already sorted
/// list into titled sections.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::params::SortMode;
use crate::state::data::Item;

/// Parsed capture time of an item.
///
/// Accepts RFC 3339 (offset kept) or a naive ISO 8601 date-time/date.
enum CaptureTime {
    Offset(DateTime<chrono::FixedOffset>),
    Naive(NaiveDateTime),
}

fn capture_time(item: &Item) -> Option<CaptureTime> {
    let raw = item.local_datetime.as_deref()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(CaptureTime::Offset(dt));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(CaptureTime::Naive(naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(CaptureTime::Naive(naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(CaptureTime::Naive)
}

/// Milliseconds since the epoch; missing or unparsable times count as 0
pub fn timestamp_millis(item: &Item) -> i64 {
    match capture_time(item) {
        Some(CaptureTime::Offset(dt)) => dt.timestamp_millis(),
        Some(CaptureTime::Naive(naive)) => naive.and_utc().timestamp_millis(),
        None => 0,
    }
}

/// Calendar day in the item's own local time (not UTC)
pub fn local_day(item: &Item) -> Option<NaiveDate> {
    match capture_time(item)? {
        CaptureTime::Offset(dt) => Some(dt.date_naive()),
        CaptureTime::Naive(naive) => Some(naive.date()),
    }
}

/// Newest first
pub fn compare_by_date(a: &Item, b: &Item) -> Ordering {
    timestamp_millis(b).cmp(&timestamp_millis(a))
}

/// Highest score first; items without a score after every scored item,
/// newest first among themselves.
pub fn compare_by_quality(a: &Item, b: &Item) -> Ordering {
    match (a.quality_score(), b.quality_score()) {
        (Some(sa), Some(sb)) => sb.total_cmp(&sa).then_with(|| compare_by_date(a, b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_by_date(a, b),
    }
}

/// Stable in-place sort
pub fn sort_items(items: &mut [Item], mode: SortMode) {
    match mode {
        SortMode::ByDate => items.sort_by(compare_by_date),
        SortMode::ByQuality => items.sort_by(compare_by_quality),
    }
}

/// Fixed score bands, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityBand {
    Top,
    Excellent,
    Good,
    Okay,
    Poor,
    Bad,
    Unknown,
}

impl QualityBand {
    pub const ALL: [QualityBand; 7] = [
        QualityBand::Top,
        QualityBand::Excellent,
        QualityBand::Good,
        QualityBand::Okay,
        QualityBand::Poor,
        QualityBand::Bad,
        QualityBand::Unknown,
    ];

    /// Scores above 1 count as top, negative scores as bad
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => QualityBand::Unknown,
            Some(s) if s.is_nan() => QualityBand::Unknown,
            Some(s) if s >= 0.99 => QualityBand::Top,
            Some(s) if s >= 0.8 => QualityBand::Excellent,
            Some(s) if s >= 0.6 => QualityBand::Good,
            Some(s) if s >= 0.4 => QualityBand::Okay,
            Some(s) if s >= 0.2 => QualityBand::Poor,
            Some(_) => QualityBand::Bad,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityBand::Top => "Top",
            QualityBand::Excellent => "Excellent",
            QualityBand::Good => "Good",
            QualityBand::Okay => "Okay",
            QualityBand::Poor => "Poor",
            QualityBand::Bad => "Bad",
            QualityBand::Unknown => "Unknown",
        }
    }
}

/// Section a group of items is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Day(NaiveDate),
    UnknownDate,
    Quality(QualityBand),
}

impl GroupKey {
    /// Section header, e.g. "Tuesday, January 2, 2024"
    pub fn label(&self) -> String {
        match self {
            GroupKey::Day(date) => date.format("%A, %B %-d, %Y").to_string(),
            GroupKey::UnknownDate => "Unknown date".to_string(),
            GroupKey::Quality(band) => band.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemGroup<'a> {
    pub key: GroupKey,
    pub items: Vec<&'a Item>,
}

/// Split a sorted list into sections.
///
/// By date, sections follow the order in which each day first appears.
/// By quality, non-empty bands follow `QualityBand::ALL`.
pub fn group_items(items: &[Item], mode: SortMode) -> Vec<ItemGroup<'_>> {
    match mode {
        SortMode::ByDate => {
            let mut groups: Vec<ItemGroup<'_>> = Vec::new();
            let mut index: HashMap<GroupKey, usize> = HashMap::new();
            for item in items {
                let key = local_day(item).map_or(GroupKey::UnknownDate, GroupKey::Day);
                let slot = *index.entry(key).or_insert_with(|| {
                    groups.push(ItemGroup {
                        key,
                        items: Vec::new(),
                    });
                    groups.len() - 1
                });
                groups[slot].items.push(item);
            }
            groups
        }
        SortMode::ByQuality => QualityBand::ALL
            .iter()
            .filter_map(|&band| {
                let members: Vec<&Item> = items
                    .iter()
                    .filter(|item| QualityBand::from_score(item.quality_score()) == band)
                    .collect();
                (!members.is_empty()).then(|| ItemGroup {
                    key: GroupKey::Quality(band),
                    items: members,
                })
            })
            .collect(),
    }
}
