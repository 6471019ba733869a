use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateDishRequest {
    pub name: String,
    #[serde(default)]
    pub calories_per_100g: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedDishResponse {
    pub id: String,
}

/// Partial catalog update. `calories_per_100g: null` clears the density,
/// leaving the field out keeps it.
#[derive(Debug, Default, Deserialize)]
pub struct DishUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub calories_per_100g: Option<Option<f64>>,
}

fn present<'de, D>(de: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}
