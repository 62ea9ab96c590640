use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The record collections that make up a dataset.
///
/// Each collection is merged independently with the same algorithm, so the
/// merge engine never looks inside the records beyond their id and
/// timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Tasks,
    Categories,
    Notes,
    Habits,
    Flashcards,
    Decks,
    PomodoroSessions,
    Timers,
    Trips,
    WorkDays,
    Commutes,
    InventoryItems,
    ItemCategories,
    ItemTags,
}

impl Collection {
    pub const ALL: [Collection; 14] = [
        Collection::Tasks,
        Collection::Categories,
        Collection::Notes,
        Collection::Habits,
        Collection::Flashcards,
        Collection::Decks,
        Collection::PomodoroSessions,
        Collection::Timers,
        Collection::Trips,
        Collection::WorkDays,
        Collection::Commutes,
        Collection::InventoryItems,
        Collection::ItemCategories,
        Collection::ItemTags,
    ];

    /// Wire and storage name of the collection.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Categories => "categories",
            Collection::Notes => "notes",
            Collection::Habits => "habits",
            Collection::Flashcards => "flashcards",
            Collection::Decks => "decks",
            Collection::PomodoroSessions => "pomodoroSessions",
            Collection::Timers => "timers",
            Collection::Trips => "trips",
            Collection::WorkDays => "workDays",
            Collection::Commutes => "commutes",
            Collection::InventoryItems => "inventoryItems",
            Collection::ItemCategories => "itemCategories",
            Collection::ItemTags => "itemTags",
        }
    }

    /// Parse from a collection name. Exact match on the wire name, falling
    /// back to a case-insensitive match for CLI convenience.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|c| c.name().eq_ignore_ascii_case(s))
            })
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let names: Vec<&str> = Self::ALL.iter().map(|c| c.name()).collect();
            format!(
                "Invalid collection '{}'. Valid options: {}",
                s,
                names.join(", ")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches_serde() {
        for collection in Collection::ALL {
            let json = serde_json::to_string(&collection).unwrap();
            assert_eq!(json, format!("\"{}\"", collection.name()));
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(Collection::parse("tasks"), Some(Collection::Tasks));
        assert_eq!(
            Collection::parse("pomodoroSessions"),
            Some(Collection::PomodoroSessions)
        );
        assert_eq!(Collection::parse("ITEMTAGS"), Some(Collection::ItemTags));
        assert_eq!(Collection::parse("dishes"), None);
    }

    #[test]
    fn test_from_str_invalid_lists_options() {
        let err = Collection::from_str("dishes").unwrap_err();
        assert!(err.contains("tasks"));
        assert!(err.contains("itemTags"));
    }
}
