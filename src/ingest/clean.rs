use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A paper metadata line as found in the raw dump. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub update_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub categories: String,
    pub update_date: String,
}

impl CleanRecord {
    /// `None` when the date is missing or not `YYYY-MM-DD`; sorts before every real date.
    pub fn parsed_update_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.update_date.trim(), "%Y-%m-%d").ok()
    }
}

/// Normalizes one record. Records without an id or with a blank abstract are dropped.
pub fn clean_record(raw: &RawRecord) -> Option<CleanRecord> {
    let abstract_text = raw.abstract_text.as_deref().unwrap_or_default().trim();
    if abstract_text.is_empty() {
        return None;
    }
    let id = raw.id.as_deref().unwrap_or_default().trim();
    if id.is_empty() {
        return None;
    }

    Some(CleanRecord {
        id: id.to_string(),
        title: raw.title.as_deref().unwrap_or_default().trim().to_string(),
        abstract_text: abstract_text.split_whitespace().collect::<Vec<_>>().join(" "),
        categories: raw.categories.clone().unwrap_or_default(),
        update_date: raw.update_date.clone().unwrap_or_default(),
    })
}

/// Keeps one record per id: the one with the latest `update_date`.
///
/// Ties keep the record seen first. Output follows the order in which each
/// id first appeared.
pub fn dedupe_latest<I>(records: I) -> Vec<CleanRecord>
where
    I: IntoIterator<Item = CleanRecord>,
{
    let mut kept: Vec<CleanRecord> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for record in records {
        match position.get(&record.id) {
            Some(&index) => {
                if record.parsed_update_date() > kept[index].parsed_update_date() {
                    kept[index] = record;
                }
            }
            None => {
                position.insert(record.id.clone(), kept.len());
                kept.push(record);
            }
        }
    }

    kept
}

pub fn clean_corpus<I>(raw: I) -> Vec<CleanRecord>
where
    I: IntoIterator<Item = RawRecord>,
{
    dedupe_latest(raw.into_iter().filter_map(|r| clean_record(&r)))
}
