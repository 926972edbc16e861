use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, TransitionError};

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(ItemId);
string_newtype!(Revision);

impl ItemId {
    /// Stable id for a matchup on a given date, e.g. `GSW_vs_LAL_2026-02-10`.
    /// Spaces inside team names collapse to underscores so the id survives
    /// query strings and job arguments unquoted.
    pub fn for_matchup(away: &str, home: &str, date: NaiveDate) -> Self {
        let away = away.trim().replace(' ', "_");
        let home = home.trim().replace(' ', "_");
        Self(format!("{away}_vs_{home}_{date}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Publishing,
    Published,
    Failed,
}

impl ItemStatus {
    /// Whether an operator control may start a publish from this status.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Failed)
    }
}

/// One publishable thread in the daily catalog. `payload` is whatever the
/// catalog builder exported; nothing here inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub payload: serde_json::Value,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl CatalogItem {
    pub fn new(id: ItemId, payload: serde_json::Value) -> Self {
        Self {
            id,
            payload,
            status: ItemStatus::Pending,
            published_at: None,
            last_error: None,
        }
    }

    /// `pending -> publishing`. Claims the item for a single worker run.
    pub fn begin_publishing(&mut self) -> Result<(), TransitionError> {
        match self.status {
            ItemStatus::Pending => {
                self.status = ItemStatus::Publishing;
                Ok(())
            }
            from => Err(TransitionError::new(from, ItemStatus::Publishing)),
        }
    }

    /// `publishing -> published`. Terminal.
    pub fn record_published(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        match self.status {
            ItemStatus::Publishing => {
                self.status = ItemStatus::Published;
                self.published_at = Some(at);
                self.last_error = None;
                Ok(())
            }
            from => Err(TransitionError::new(from, ItemStatus::Published)),
        }
    }

    /// `publishing -> failed`. Terminal until an operator retries.
    pub fn record_failed(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        match self.status {
            ItemStatus::Publishing => {
                self.status = ItemStatus::Failed;
                self.last_error = Some(reason.into());
                Ok(())
            }
            from => Err(TransitionError::new(from, ItemStatus::Failed)),
        }
    }

    /// `failed -> pending`. Only an explicit operator retry goes through
    /// here; nothing in the worker or client resets a failure on its own.
    pub fn reset_for_retry(&mut self) -> Result<(), TransitionError> {
        match self.status {
            ItemStatus::Failed => {
                self.status = ItemStatus::Pending;
                self.last_error = None;
                Ok(())
            }
            from => Err(TransitionError::new(from, ItemStatus::Pending)),
        }
    }
}

/// The versioned catalog document: one day's publishable items, ordered the
/// way the builder wants them shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<CatalogItem>,
}

impl Catalog {
    /// Builder-facing constructor; item ids must be unique within the day.
    pub fn new(
        date: NaiveDate,
        generated_at: DateTime<Utc>,
        items: Vec<CatalogItem>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.id.clone()) {
                return Err(CatalogError::DuplicateItem(item.id.clone()));
            }
        }
        Ok(Self {
            date,
            generated_at,
            items,
        })
    }

    pub fn item(&self, id: &ItemId) -> Option<&CatalogItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn item_mut(&mut self, id: &ItemId) -> Option<&mut CatalogItem> {
        self.items.iter_mut().find(|item| &item.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    fn item(id: &str) -> CatalogItem {
        CatalogItem::new(ItemId::new(id), json!({"matchup": "GSW @ LAL"}))
    }

    #[test]
    fn matchup_id_is_stable_and_unquoted() {
        let id = ItemId::for_matchup("GSW", "LAL", date());
        assert_eq!(id.as_str(), "GSW_vs_LAL_2026-02-10");

        let id = ItemId::for_matchup("Trail Blazers", "Golden State", date());
        assert_eq!(id.as_str(), "Trail_Blazers_vs_Golden_State_2026-02-10");
    }

    #[test]
    fn happy_path_transitions() {
        let mut item = item("GSW_vs_LAL_2026-02-10");
        assert_eq!(item.status, ItemStatus::Pending);

        item.begin_publishing().unwrap();
        assert_eq!(item.status, ItemStatus::Publishing);

        item.record_published(Utc::now()).unwrap();
        assert_eq!(item.status, ItemStatus::Published);
        assert!(item.published_at.is_some());
        assert!(item.last_error.is_none());
    }

    #[test]
    fn failure_keeps_reason_until_retry() {
        let mut item = item("GSW_vs_LAL_2026-02-10");
        item.begin_publishing().unwrap();
        item.record_failed("render failed: upstream 500").unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(
            item.last_error.as_deref(),
            Some("render failed: upstream 500")
        );

        item.reset_for_retry().unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.last_error.is_none());
    }

    #[test]
    fn publishing_cannot_be_skipped() {
        let mut item = item("GSW_vs_LAL_2026-02-10");
        let err = item.record_published(Utc::now()).unwrap_err();
        assert_eq!(err.from, ItemStatus::Pending);

        let err = item.record_failed("nope").unwrap_err();
        assert_eq!(err.from, ItemStatus::Pending);
        assert_eq!(item.status, ItemStatus::Pending);
    }

    #[test]
    fn terminal_published_rejects_everything() {
        let mut item = item("GSW_vs_LAL_2026-02-10");
        item.begin_publishing().unwrap();
        item.record_published(Utc::now()).unwrap();

        assert!(item.begin_publishing().is_err());
        assert!(item.record_failed("late").is_err());
        assert!(item.reset_for_retry().is_err());
        assert_eq!(item.status, ItemStatus::Published);
    }

    #[test]
    fn only_failed_items_reset() {
        let mut item = item("GSW_vs_LAL_2026-02-10");
        assert!(item.reset_for_retry().is_err());
        item.begin_publishing().unwrap();
        assert!(item.reset_for_retry().is_err());
    }

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let items = vec![item("A_vs_B_2026-02-10"), item("A_vs_B_2026-02-10")];
        let err = Catalog::new(date(), Utc::now(), items).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateItem(id) if id.as_str() == "A_vs_B_2026-02-10"));
    }

    #[test]
    fn document_round_trips_and_tolerates_missing_optionals() {
        let catalog = Catalog::new(
            date(),
            Utc::now(),
            vec![item("GSW_vs_LAL_2026-02-10")],
        )
        .unwrap();

        let encoded = serde_json::to_string(&catalog).unwrap();
        assert!(!encoded.contains("published_at"));
        assert!(!encoded.contains("last_error"));

        let decoded: Catalog = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.items.len(), 1);
        assert_eq!(decoded.items[0].status, ItemStatus::Pending);
    }
}
