use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::dto::{DayStats, DishPatch, NewDish};
use super::repo::{DailyMealStore, MEALS_COLLECTION};
use super::repo_types::{DayMeals, DayRecord, DishEntry, Slot};
use crate::calories::calories_from_grams;
use crate::error::{ApiError, StoreError};

pub(crate) fn is_valid_meal_time(time: &str) -> bool {
    lazy_static! {
        static ref TIME_RE: Regex = Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap();
    }
    TIME_RE.is_match(time)
}

/// Heaviest plate weight accepted, in grams.
pub const MAX_WEIGHT_GRAMS: f64 = 100_000.0;

fn validate_weights(weights: &[Option<f64>]) -> Result<(), ApiError> {
    if weights
        .iter()
        .flatten()
        .any(|w| !(0.0..=MAX_WEIGHT_GRAMS).contains(w))
    {
        return Err(ApiError::Validation(format!(
            "weights must be between 0 and {MAX_WEIGHT_GRAMS} grams"
        )));
    }
    Ok(())
}

/// Checks a whole day sent for overwrite: slot times and every dish weight.
pub fn validate_day(meals: &DayMeals) -> Result<(), ApiError> {
    for (slot, meal) in meals.iter() {
        if !is_valid_meal_time(&meal.time) {
            return Err(ApiError::Validation(format!(
                "invalid time for {}: {}",
                slot.as_str(),
                meal.time
            )));
        }
        for dish in &meal.dishes {
            validate_weights(&[Some(dish.before), Some(dish.after)])?;
        }
    }
    Ok(())
}

fn dish_not_found(date: &str, slot: Slot, dish_id: i64) -> StoreError {
    StoreError::not_found(MEALS_COLLECTION, &format!("{date}/{}/{dish_id}", slot.as_str()))
}

/// Tracker header numbers for one day. Calories come from the summed grams.
pub fn day_stats(day: &DayRecord) -> DayStats {
    let grams = day.total_grams();
    DayStats {
        grams,
        calories: calories_from_grams(grams),
    }
}

pub async fn add_dish(
    meals: &DailyMealStore,
    date: &str,
    slot: Slot,
    new: NewDish,
) -> Result<(DayRecord, DishEntry), ApiError> {
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("dish name is required".into()));
    }
    validate_weights(&[Some(new.before), Some(new.after)])?;

    let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let (day, entry) = meals
        .modify(date, None, |m| {
            let meal = m.slot_mut(slot);
            let entry = DishEntry {
                id: meal.next_dish_id(now_ms),
                name,
                before: new.before,
                after: new.after,
            };
            meal.dishes.push(entry.clone());
            Ok(entry)
        })
        .await?;
    info!(date, slot = slot.as_str(), dish_id = entry.id, "dish added");
    Ok((day, entry))
}

pub async fn update_dish(
    meals: &DailyMealStore,
    date: &str,
    slot: Slot,
    dish_id: i64,
    patch: DishPatch,
    expected_version: Option<i64>,
) -> Result<(DayRecord, DishEntry), ApiError> {
    let name = match patch.name {
        Some(n) if n.trim().is_empty() => {
            return Err(ApiError::Validation("dish name is required".into()))
        }
        Some(n) => Some(n.trim().to_string()),
        None => None,
    };
    validate_weights(&[patch.before, patch.after])?;

    let (day, entry) = meals
        .modify(date, expected_version, |m| {
            let dish = m
                .slot_mut(slot)
                .dish_mut(dish_id)
                .ok_or_else(|| dish_not_found(date, slot, dish_id))?;
            if let Some(name) = name {
                dish.name = name;
            }
            if let Some(before) = patch.before {
                dish.before = before;
            }
            if let Some(after) = patch.after {
                dish.after = after;
            }
            Ok(dish.clone())
        })
        .await?;
    info!(date, slot = slot.as_str(), dish_id, "dish updated");
    Ok((day, entry))
}

pub async fn delete_dish(
    meals: &DailyMealStore,
    date: &str,
    slot: Slot,
    dish_id: i64,
    expected_version: Option<i64>,
) -> Result<DayRecord, ApiError> {
    let (day, ()) = meals
        .modify(date, expected_version, |m| {
            let dishes = &mut m.slot_mut(slot).dishes;
            let before = dishes.len();
            dishes.retain(|d| d.id != dish_id);
            if dishes.len() == before {
                return Err(dish_not_found(date, slot, dish_id));
            }
            Ok(())
        })
        .await?;
    info!(date, slot = slot.as_str(), dish_id, "dish deleted");
    Ok(day)
}

pub async fn clear_slot(meals: &DailyMealStore, date: &str, slot: Slot) -> Result<DayRecord, ApiError> {
    let (day, removed) = meals
        .modify(date, None, |m| {
            let dishes = &mut m.slot_mut(slot).dishes;
            let removed = dishes.len();
            dishes.clear();
            Ok(removed)
        })
        .await?;
    info!(date, slot = slot.as_str(), removed, "meal cleared");
    Ok(day)
}

pub async fn set_slot_time(
    meals: &DailyMealStore,
    date: &str,
    slot: Slot,
    time: &str,
) -> Result<DayRecord, ApiError> {
    if !is_valid_meal_time(time) {
        warn!(time, "invalid meal time");
        return Err(ApiError::Validation(format!("invalid meal time: {time}")));
    }
    let (day, ()) = meals
        .modify(date, None, |m| {
            m.slot_mut(slot).time = time.to_string();
            Ok(())
        })
        .await?;
    Ok(day)
}
