use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use tracing::instrument;

use super::dto::{
    DayResponse, DishPatch, DishResponse, NewDish, PutDayRequest, SetTimeRequest, VersionQuery,
};
use super::repo_types::{DayRecord, Slot};
use super::services;
use crate::dates::date_key;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn day_routes() -> Router<AppState> {
    Router::new()
        .route("/days/:date", get(get_day).put(put_day))
        .route("/days/:date/meals/:slot/time", put(set_time))
}

pub fn dish_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/days/:date/meals/:slot/dishes",
            post(add_dish).delete(clear_meal),
        )
        .route(
            "/days/:date/meals/:slot/dishes/:dish_id",
            patch(update_dish).delete(delete_dish),
        )
}

fn respond(day: DayRecord) -> Json<DayResponse> {
    let stats = services::day_stats(&day);
    Json(DayResponse { day, stats })
}

#[instrument(skip(state))]
pub async fn get_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> ApiResult<Json<DayResponse>> {
    let date = date_key(&date)?;
    let day = state.meals.get_or_default(&date).await?;
    Ok(respond(day))
}

#[instrument(skip(state, body))]
pub async fn put_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Json(body): Json<PutDayRequest>,
) -> ApiResult<Json<DayResponse>> {
    let date = date_key(&date)?;
    services::validate_day(&body.meals)?;
    let day = state.meals.put(&date, body.meals).await?;
    Ok(respond(day))
}

#[instrument(skip(state, body))]
pub async fn add_dish(
    State(state): State<AppState>,
    Path((date, slot)): Path<(String, Slot)>,
    Json(body): Json<NewDish>,
) -> ApiResult<(StatusCode, Json<DishResponse>)> {
    let date = date_key(&date)?;
    let (day, dish) = services::add_dish(&state.meals, &date, slot, body).await?;
    Ok((StatusCode::CREATED, Json(DishResponse::new(dish, day.version))))
}

#[instrument(skip(state, body))]
pub async fn update_dish(
    State(state): State<AppState>,
    Path((date, slot, dish_id)): Path<(String, Slot, i64)>,
    Query(q): Query<VersionQuery>,
    Json(body): Json<DishPatch>,
) -> ApiResult<Json<DishResponse>> {
    let date = date_key(&date)?;
    let (day, dish) =
        services::update_dish(&state.meals, &date, slot, dish_id, body, q.expected_version).await?;
    Ok(Json(DishResponse::new(dish, day.version)))
}

#[instrument(skip(state))]
pub async fn delete_dish(
    State(state): State<AppState>,
    Path((date, slot, dish_id)): Path<(String, Slot, i64)>,
    Query(q): Query<VersionQuery>,
) -> ApiResult<StatusCode> {
    let date = date_key(&date)?;
    services::delete_dish(&state.meals, &date, slot, dish_id, q.expected_version).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn clear_meal(
    State(state): State<AppState>,
    Path((date, slot)): Path<(String, Slot)>,
) -> ApiResult<StatusCode> {
    let date = date_key(&date)?;
    services::clear_slot(&state.meals, &date, slot).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn set_time(
    State(state): State<AppState>,
    Path((date, slot)): Path<(String, Slot)>,
    Json(body): Json<SetTimeRequest>,
) -> ApiResult<Json<DayResponse>> {
    let date = date_key(&date)?;
    let day = services::set_slot_time(&state.meals, &date, slot, &body.time).await?;
    Ok(respond(day))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::error::StoreError;
    use crate::storage::{Document, DocumentStore, MemoryStore};

    fn app() -> Router {
        Router::new()
            .merge(day_routes())
            .merge(dish_routes())
            .with_state(AppState::fake())
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    #[tokio::test]
    async fn unsaved_day_comes_back_with_default_slots() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/days/2024-06-01", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date"], "2024-06-01");
        assert_eq!(body["version"], 0);
        assert_eq!(body["meals"]["meal4"]["time"], "20:00");
        assert_eq!(body["stats"]["calories"], 0);
    }

    #[tokio::test]
    async fn bad_date_is_a_validation_error() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/days/June-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn dish_lifecycle_over_http() {
        let app = app();
        let (status, created) = call(
            &app,
            Method::POST,
            "/days/2024-06-01/meals/meal1/dishes",
            Some(json!({"name": "Yogurt", "before": 100, "after": 40})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["grams"], 60.0);
        assert_eq!(created["calories"], 72);
        let dish_id = created["dish"]["id"].as_i64().unwrap();
        let version = created["version"].as_i64().unwrap();

        let uri = format!("/days/2024-06-01/meals/meal1/dishes/{dish_id}?expected_version={version}");
        let (status, updated) = call(&app, Method::PATCH, &uri, Some(json!({"after": 50}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["calories"], 60);

        // the version moved on, so the old token is stale
        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/days/2024-06-01/meals/meal1/dishes/{dish_id}");
        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, day) = call(&app, Method::GET, "/days/2024-06-01", None).await;
        assert_eq!(day["meals"]["meal1"]["dishes"], json!([]));
    }

    #[tokio::test]
    async fn unknown_slot_is_rejected() {
        let app = app();
        let (status, _) = call(
            &app,
            Method::POST,
            "/days/2024-06-01/meals/brunch/dishes",
            Some(json!({"name": "Egg", "before": 10, "after": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_day_overwrites_and_computes_stats() {
        let app = app();
        let meals = json!({
            "meal1": {"time": "07:30", "dishes": [{"id": 1, "name": "Porridge", "before": 150, "after": 100}]},
            "meal2": {"time": "12:00", "dishes": []},
            "meal3": {"time": "16:00", "dishes": []},
            "meal4": {"time": "20:00", "dishes": [{"id": 2, "name": "Milk", "before": 33, "after": 0}]}
        });
        let (status, body) = call(&app, Method::PUT, "/days/2024-06-02", Some(json!({"meals": meals}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["grams"], 83.0);
        assert_eq!(body["stats"]["calories"], 100);
        assert_eq!(body["version"], 1);

        let (_, fetched) = call(&app, Method::GET, "/days/2024-06-02", None).await;
        assert_eq!(fetched["meals"], meals_normalized(&meals));
    }

    fn meals_normalized(v: &Value) -> Value {
        // numbers come back as floats once stored
        let mut v = v.clone();
        for slot in ["meal1", "meal2", "meal3", "meal4"] {
            if let Some(dishes) = v[slot]["dishes"].as_array_mut() {
                for d in dishes {
                    for k in ["before", "after"] {
                        let n = d[k].as_f64().unwrap();
                        d[k] = json!(n);
                    }
                }
            }
        }
        v
    }

    #[tokio::test]
    async fn set_time_validates_format() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::PUT,
            "/days/2024-06-01/meals/meal3/time",
            Some(json!({"time": "15:45"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meals"]["meal3"]["time"], "15:45");

        let (status, _) = call(
            &app,
            Method::PUT,
            "/days/2024-06-01/meals/meal3/time",
            Some(json!({"time": "quarter to four"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_or_padded_dates_are_not_separate_days() {
        let app = app();
        for uri in ["/days/+2024-01-05", "/days/-2024-01-05", "/days/02024-01-05"] {
            let (status, body) = call(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["code"], "VALIDATION_ERROR");
        }
        let (status, _) = call(
            &app,
            Method::POST,
            "/days/+2024-01-05/meals/meal1/dishes",
            Some(json!({"name": "Egg", "before": 10, "after": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_day_rejects_oversized_weights() {
        let app = app();
        let meals = json!({
            "meal1": {"time": "08:00", "dishes": [{"id": 1, "name": "Rice", "before": 1e300, "after": 0}]},
            "meal2": {"time": "12:00", "dishes": []},
            "meal3": {"time": "16:00", "dishes": []},
            "meal4": {"time": "20:00", "dishes": []}
        });
        let (status, _) = call(&app, Method::PUT, "/days/2024-06-03", Some(json!({"meals": meals}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, day) = call(&app, Method::GET, "/days/2024-06-03", None).await;
        assert_eq!(day["version"], 0);
    }

    /// Serves reads from memory but fails every write as if the database were gone.
    struct WritesDown(MemoryStore);

    #[async_trait]
    impl DocumentStore for WritesDown {
        async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
            self.0.get(collection, id).await
        }
        async fn put(&self, _c: &str, _id: &str, _data: Value, _v: Option<i64>) -> Result<Document, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn insert(&self, _c: &str, _data: Value) -> Result<Document, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn merge(&self, _c: &str, _id: &str, _fields: Value) -> Result<Document, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _c: &str, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
            self.0.list(collection).await
        }
        async fn range(&self, collection: &str, start: &str, end: &str) -> Result<Vec<Document>, StoreError> {
            self.0.range(collection, start, end).await
        }
    }

    #[tokio::test]
    async fn store_outage_is_503_and_keeps_the_stored_day() {
        let memory = MemoryStore::new();
        let saved = json!({
            "date": "2024-06-04",
            "meals": {
                "meal1": {"time": "08:00", "dishes": [{"id": 7, "name": "Pear", "before": 50.0, "after": 10.0}]},
                "meal2": {"time": "12:00", "dishes": []},
                "meal3": {"time": "16:00", "dishes": []},
                "meal4": {"time": "20:00", "dishes": []}
            }
        });
        memory.put("meals", "2024-06-04", saved, None).await.unwrap();
        let state = AppState::from_parts(Arc::new(AppConfig::memory()), Arc::new(WritesDown(memory)));
        let app = Router::new()
            .merge(day_routes())
            .merge(dish_routes())
            .with_state(state);

        let (status, body) = call(
            &app,
            Method::POST,
            "/days/2024-06-04/meals/meal1/dishes",
            Some(json!({"name": "Rice", "before": 30, "after": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "STORE_UNAVAILABLE");

        let (status, _) = call(&app, Method::DELETE, "/days/2024-06-04/meals/meal1/dishes/7", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, day) = call(&app, Method::GET, "/days/2024-06-04", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(day["version"], 1);
        assert_eq!(day["meals"]["meal1"]["dishes"][0]["name"], "Pear");
        assert_eq!(day["meals"]["meal1"]["dishes"].as_array().unwrap().len(), 1);
    }
}
