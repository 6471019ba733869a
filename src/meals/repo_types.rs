use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::calories::calories_from_grams;

/// One of the four fixed meals of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Meal1,
    Meal2,
    Meal3,
    Meal4,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Meal1, Slot::Meal2, Slot::Meal3, Slot::Meal4];

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Meal1 => "meal1",
            Slot::Meal2 => "meal2",
            Slot::Meal3 => "meal3",
            Slot::Meal4 => "meal4",
        }
    }

    pub fn default_time(self) -> &'static str {
        match self {
            Slot::Meal1 => "08:00",
            Slot::Meal2 => "12:00",
            Slot::Meal3 => "16:00",
            Slot::Meal4 => "20:00",
        }
    }
}

/// A dish served in a meal, weighed before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishEntry {
    pub id: i64,
    pub name: String,
    pub before: f64, // grams served
    pub after: f64, // grams left over
}

impl DishEntry {
    pub fn grams(&self) -> f64 {
        self.before - self.after
    }

    pub fn calories(&self) -> i64 {
        calories_from_grams(self.grams())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealSlot {
    pub time: String,
    pub dishes: Vec<DishEntry>,
}

impl MealSlot {
    pub fn empty(slot: Slot) -> Self {
        Self {
            time: slot.default_time().to_string(),
            dishes: Vec::new(),
        }
    }

    pub fn calories(&self) -> i64 {
        self.dishes.iter().map(DishEntry::calories).fold(0, i64::saturating_add)
    }

    pub fn dish_mut(&mut self, dish_id: i64) -> Option<&mut DishEntry> {
        self.dishes.iter_mut().find(|d| d.id == dish_id)
    }

    /// Picks an id for a new dish: `now_ms`, bumped past any id already used.
    pub fn next_dish_id(&self, now_ms: i64) -> i64 {
        let mut id = now_ms;
        while self.dishes.iter().any(|d| d.id == id) {
            id += 1;
        }
        id
    }
}

/// The four meals of a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayMeals {
    pub meal1: MealSlot,
    pub meal2: MealSlot,
    pub meal3: MealSlot,
    pub meal4: MealSlot,
}

impl Default for DayMeals {
    fn default() -> Self {
        Self {
            meal1: MealSlot::empty(Slot::Meal1),
            meal2: MealSlot::empty(Slot::Meal2),
            meal3: MealSlot::empty(Slot::Meal3),
            meal4: MealSlot::empty(Slot::Meal4),
        }
    }
}

impl DayMeals {
    pub fn slot(&self, slot: Slot) -> &MealSlot {
        match slot {
            Slot::Meal1 => &self.meal1,
            Slot::Meal2 => &self.meal2,
            Slot::Meal3 => &self.meal3,
            Slot::Meal4 => &self.meal4,
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut MealSlot {
        match slot {
            Slot::Meal1 => &mut self.meal1,
            Slot::Meal2 => &mut self.meal2,
            Slot::Meal3 => &mut self.meal3,
            Slot::Meal4 => &mut self.meal4,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &MealSlot)> + '_ {
        Slot::ALL.into_iter().map(move |s| (s, self.slot(s)))
    }

    pub fn dishes(&self) -> impl Iterator<Item = &DishEntry> + '_ {
        self.iter().flat_map(|(_, m)| m.dishes.iter())
    }
}

/// Everything logged for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRecord {
    pub date: String,
    pub meals: DayMeals,
    /// Store write counter; 0 while the day has never been saved.
    pub version: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl DayRecord {
    pub fn empty(date: &str) -> Self {
        Self {
            date: date.to_string(),
            meals: DayMeals::default(),
            version: 0,
            updated_at: None,
        }
    }

    pub fn total_grams(&self) -> f64 {
        self.meals.dishes().map(DishEntry::grams).sum()
    }

    pub fn total_calories(&self) -> i64 {
        self.meals.iter().map(|(_, m)| m.calories()).fold(0, i64::saturating_add)
    }
}

/// Shape of a `meals/{date}` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredDay {
    pub date: String,
    pub meals: DayMeals,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub updated_at: Option<OffsetDateTime>,
}
