use serde::{Deserialize, Serialize};

use super::repo_types::{DayMeals, DayRecord, DishEntry};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayStats {
    pub grams: f64,
    pub calories: i64,
}

#[derive(Debug, Serialize)]
pub struct DayResponse {
    #[serde(flatten)]
    pub day: DayRecord,
    pub stats: DayStats,
}

#[derive(Debug, Deserialize)]
pub struct PutDayRequest {
    pub meals: DayMeals,
}

#[derive(Debug, Deserialize)]
pub struct NewDish {
    pub name: String,
    pub before: f64,
    pub after: f64,
}

/// Fields to change on a logged dish; absent fields are kept.
#[derive(Debug, Default, Deserialize)]
pub struct DishPatch {
    pub name: Option<String>,
    pub before: Option<f64>,
    pub after: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SetTimeRequest {
    pub time: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    pub expected_version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DishResponse {
    pub dish: DishEntry,
    pub grams: f64,
    pub calories: i64,
    pub version: i64, // day version after the write
}

impl DishResponse {
    pub fn new(dish: DishEntry, version: i64) -> Self {
        Self {
            grams: dish.grams(),
            calories: dish.calories(),
            dish,
            version,
        }
    }
}
