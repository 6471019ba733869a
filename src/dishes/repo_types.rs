use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A reusable dish name with an optional calorie density.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DishCatalogItem {
    pub id: String,
    pub name: String,
    pub calories_per_100g: Option<f64>,
}

/// Shape of a `dishDatabase/{id}` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredDish {
    pub name: String,
    #[serde(default)]
    pub calories_per_100g: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Partial update written with a document merge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredDishPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories_per_100g: Option<Option<f64>>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Orders names the way a dictionary would: letters compare without case
/// first, then lowercase sorts ahead of uppercase, then plain byte order.
pub fn collate_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded
        .then_with(|| {
            a.chars()
                .zip(b.chars())
                .map(|(x, y)| match (x.is_lowercase(), y.is_lowercase()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.cmp(b))
}
