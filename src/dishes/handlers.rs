use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{CreateDishRequest, CreatedDishResponse, DishUpdate, SearchQuery};
use super::repo_types::DishCatalogItem;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn dish_routes() -> Router<AppState> {
    Router::new()
        .route("/dishes", get(list_dishes).post(create_dish))
        .route("/dishes/search", get(search_dishes))
        .route("/dishes/:id", patch(update_dish).delete(delete_dish))
}

fn clean_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        warn!("empty dish name");
        return Err(ApiError::Validation("dish name is required".into()));
    }
    Ok(name.to_string())
}

fn check_density(calories: Option<f64>) -> Result<(), ApiError> {
    match calories {
        Some(c) if !c.is_finite() || c < 0.0 => Err(ApiError::Validation(
            "calories_per_100g must be a non-negative number".into(),
        )),
        _ => Ok(()),
    }
}

#[instrument(skip(state))]
pub async fn list_dishes(State(state): State<AppState>) -> ApiResult<Json<Vec<DishCatalogItem>>> {
    Ok(Json(state.dishes.list_all().await?))
}

#[instrument(skip(state))]
pub async fn search_dishes(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<Vec<DishCatalogItem>>> {
    Ok(Json(state.dishes.search(&q.q).await?))
}

#[instrument(skip(state, body))]
pub async fn create_dish(
    State(state): State<AppState>,
    Json(body): Json<CreateDishRequest>,
) -> ApiResult<(StatusCode, Json<CreatedDishResponse>)> {
    let name = clean_name(&body.name)?;
    check_density(body.calories_per_100g)?;
    let id = state.dishes.add(&name, body.calories_per_100g).await?;
    info!(%id, %name, "dish added to catalog");
    Ok((StatusCode::CREATED, Json(CreatedDishResponse { id })))
}

#[instrument(skip(state, body))]
pub async fn update_dish(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<DishUpdate>,
) -> ApiResult<StatusCode> {
    body.name = body.name.as_deref().map(clean_name).transpose()?;
    check_density(body.calories_per_100g.flatten())?;
    state.dishes.update(&id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_dish(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.dishes.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
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
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn catalog_crud_over_http() {
        let app = dish_routes().with_state(AppState::fake());

        for (name, kcal) in [("Banana", json!(89)), ("apple", Value::Null), ("Carrot", json!(41))] {
            let (status, body) = send(
                &app,
                Method::POST,
                "/dishes",
                Some(json!({"name": name, "calories_per_100g": kcal})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert!(body["id"].is_string());
        }

        let (status, list) = send(&app, Method::GET, "/dishes", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = list.as_array().unwrap().iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, [json!("apple"), json!("Banana"), json!("Carrot")]);

        let carrot_id = list[2]["id"].as_str().unwrap().to_string();
        let (status, _) = send(
            &app,
            Method::PATCH,
            &format!("/dishes/{carrot_id}"),
            Some(json!({"calories_per_100g": null})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, found) = send(&app, Method::GET, "/dishes/search?q=car", None).await;
        assert_eq!(found[0]["name"], "Carrot");
        assert!(found[0]["calories_per_100g"].is_null());

        let (status, _) = send(&app, Method::DELETE, &format!("/dishes/{carrot_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, &format!("/dishes/{carrot_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/dishes/{carrot_id}"),
            Some(json!({"name": "Carrots"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn blank_names_and_negative_density_are_rejected() {
        let app = dish_routes().with_state(AppState::fake());
        let (status, _) = send(&app, Method::POST, "/dishes", Some(json!({"name": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/dishes",
            Some(json!({"name": "Rice", "calories_per_100g": -5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
