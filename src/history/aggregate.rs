//! Reducers over fetched day records. All calorie figures use per-dish
//! rounding, so a day total is the sum of its dishes' calories. Sums
//! saturate rather than wrap.

use serde::Serialize;

use crate::calories::round_half_up;
use crate::meals::repo_types::{DayRecord, DishEntry, Slot};

pub fn total_calories(records: &[DayRecord]) -> i64 {
    records.iter().map(DayRecord::total_calories).fold(0, i64::saturating_add)
}

pub fn average_daily_calories(records: &[DayRecord]) -> i64 {
    if records.is_empty() {
        return 0;
    }
    round_half_up(total_calories(records) as f64 / records.len() as f64)
}

pub fn per_slot_average(records: &[DayRecord], slot: Slot) -> i64 {
    if records.is_empty() {
        return 0;
    }
    let sum = records
        .iter()
        .map(|r| r.meals.slot(slot).calories())
        .fold(0, i64::saturating_add);
    round_half_up(sum as f64 / records.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedDish {
    pub id: i64,
    pub name: String,
    pub before: f64,
    pub after: f64,
    pub grams: f64,
    pub calories: i64,
}

impl From<&DishEntry> for AnnotatedDish {
    fn from(d: &DishEntry) -> Self {
        Self {
            id: d.id,
            name: d.name.clone(),
            before: d.before,
            after: d.after,
            grams: d.grams(),
            calories: d.calories(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedMeal {
    pub slot: Slot,
    pub time: String,
    pub calories: i64,
    pub dishes: Vec<AnnotatedDish>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedDay {
    pub date: String,
    pub version: i64,
    pub total_calories: i64,
    pub meals: Vec<AnnotatedMeal>,
}

pub fn annotate(day: &DayRecord) -> AnnotatedDay {
    let meals = day
        .meals
        .iter()
        .map(|(slot, meal)| AnnotatedMeal {
            slot,
            time: meal.time.clone(),
            calories: meal.calories(),
            dishes: meal.dishes.iter().map(AnnotatedDish::from).collect(),
        })
        .collect::<Vec<_>>();
    AnnotatedDay {
        date: day.date.clone(),
        version: day.version,
        total_calories: meals.iter().map(|m| m.calories).fold(0, i64::saturating_add),
        meals,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotAverages {
    pub meal1: i64,
    pub meal2: i64,
    pub meal3: i64,
    pub meal4: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeSummary {
    pub days: usize,
    pub total_calories: i64,
    pub average_daily_calories: i64,
    pub slot_averages: SlotAverages,
}

pub fn summarize(records: &[DayRecord]) -> RangeSummary {
    RangeSummary {
        days: records.len(),
        total_calories: total_calories(records),
        average_daily_calories: average_daily_calories(records),
        slot_averages: SlotAverages {
            meal1: per_slot_average(records, Slot::Meal1),
            meal2: per_slot_average(records, Slot::Meal2),
            meal3: per_slot_average(records, Slot::Meal3),
            meal4: per_slot_average(records, Slot::Meal4),
        },
    }
}
