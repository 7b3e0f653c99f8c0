use std::collections::HashMap;
use std::fmt;

use crate::entity::GiftId;

/// Closed set of gift animation styles the render layer knows how to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationProfile {
    Floating,
    Rotating,
    Shining,
    Exploding,
    Twinkling,
    Flying,
    Rising,
    Burning,
    Rainbow,
    Pulsing,
}

impl fmt::Display for AnimationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnimationProfile::Floating => "floating",
            AnimationProfile::Rotating => "rotating",
            AnimationProfile::Shining => "shining",
            AnimationProfile::Exploding => "exploding",
            AnimationProfile::Twinkling => "twinkling",
            AnimationProfile::Flying => "flying",
            AnimationProfile::Rising => "rising",
            AnimationProfile::Burning => "burning",
            AnimationProfile::Rainbow => "rainbow",
            AnimationProfile::Pulsing => "pulsing",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GiftCatalogEntry {
    pub id: GiftId,
    pub display_name: String,
    pub point_cost: u64,
    pub animation: AnimationProfile,
    pub icon: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate gift id: {0}")]
    DuplicateGift(GiftId),
    #[error("gift {0} has a zero point cost")]
    ZeroCost(GiftId),
    #[error("catalog is empty")]
    Empty,
}

/// Static, validated gift catalog. Entries keep their configured order for
/// display; lookups go through the id index.
#[derive(Debug, Clone)]
pub struct GiftCatalog {
    entries: Vec<GiftCatalogEntry>,
    by_id: HashMap<GiftId, usize>,
}

impl GiftCatalog {
    pub fn from_entries(entries: Vec<GiftCatalogEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut by_id = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            if entry.point_cost == 0 {
                return Err(CatalogError::ZeroCost(entry.id.clone()));
            }
            if by_id.insert(entry.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateGift(entry.id.clone()));
            }
        }
        Ok(Self { entries, by_id })
    }

    pub fn get(&self, id: &GiftId) -> Option<&GiftCatalogEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[GiftCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GiftCatalog {
    /// The stock catalog used when no external one is configured.
    fn default() -> Self {
        let entries = vec![
            entry("heart", "Heart", 5, AnimationProfile::Twinkling, "\u{2764}"),
            entry("rose", "Rose", 20, AnimationProfile::Floating, "\u{1F339}"),
            entry("star", "Star", 25, AnimationProfile::Shining, "\u{2B50}"),
            entry("rocket", "Rocket", 45, AnimationProfile::Flying, "\u{1F680}"),
            entry("crown", "Crown", 75, AnimationProfile::Rotating, "\u{1F451}"),
            entry(
                "castle",
                "Castle",
                100,
                AnimationProfile::Exploding,
                "\u{1F3F0}",
            ),
        ];
        Self::from_entries(entries).unwrap_or_else(|_| unreachable!("stock catalog is valid"))
    }
}

fn entry(
    id: &str,
    display_name: &str,
    point_cost: u64,
    animation: AnimationProfile,
    icon: &str,
) -> GiftCatalogEntry {
    GiftCatalogEntry {
        id: GiftId::new(id.to_string()).unwrap_or_else(|_| unreachable!("stock gift id is valid")),
        display_name: display_name.to_string(),
        point_cost,
        animation,
        icon: icon.to_string(),
    }
}
