/// Estimated calories per gram of consumed food.
///
/// Applied to every dish regardless of the catalog's per-100g density.
pub const CALORIES_PER_GRAM: f64 = 1.2;

/// Rounds to the nearest integer with ties going up, e.g. 2.5 -> 3 and -2.5 -> -2.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

pub fn calories_from_grams(grams: f64) -> i64 {
    round_half_up(grams * CALORIES_PER_GRAM)
}
