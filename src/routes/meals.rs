use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Local;
use serde_json::json;
use tracing::info;

use super::queue_best_effort;
use crate::auth::authorize;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::meals::{ensure_within_cutoff, MealCancellation, MealRequest, MealSheetQuery};
use crate::notify;
use crate::store::{MealKey, Store};

#[post("/meals")]
async fn request_meal(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    json: web::Json<MealRequest>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let user_id = auth.require_member()?.to_string();
    let request = json.into_inner();
    request.validate()?;
    ensure_within_cutoff(
        request.date,
        request.meal_type,
        Local::now().naive_local(),
        "Requests",
    )?;

    let group = store.find_group(&request.group_id).await?;
    auth.require_group_member(&group)?;

    let key = MealKey {
        group_id: &group.id,
        user_id: &user_id,
        date: request.date,
        meal_type: request.meal_type,
    };
    let existing = store.find_meal(&key).await?;
    let meal = request.merge_into(existing, user_id.clone())?;
    store.save_meal(&meal).await?;
    info!(
        group = %group.id,
        member = %user_id,
        date = %meal.date,
        meal = ?meal.meal_type,
        quantity = meal.total_quantity,
        "Meal request saved"
    );

    if let Some(leader) = store.find_member(&group.leader).await? {
        let requester = store
            .find_member(&user_id)
            .await?
            .map(|m| m.name)
            .unwrap_or_else(|| user_id.clone());
        let notices = notify::meal_update(&leader, &requester, &meal);
        queue_best_effort(&store, &notices, "meal update").await;
    }
    Ok(HttpResponse::Ok().json(meal))
}

#[post("/meals/cancel")]
async fn cancel_meal(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    json: web::Json<MealCancellation>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let user_id = auth.require_member()?.to_string();
    let cancellation = json.into_inner();
    ensure_within_cutoff(
        cancellation.date,
        cancellation.meal_type,
        Local::now().naive_local(),
        "Cancellations",
    )?;

    let key = MealKey {
        group_id: &cancellation.group_id,
        user_id: &user_id,
        date: cancellation.date,
        meal_type: cancellation.meal_type,
    };
    let mut meal = store
        .find_meal(&key)
        .await?
        .ok_or_else(|| AppError::not_found("Meal", format!("{:?} on {}", key.meal_type, key.date)))?;
    meal.cancel();
    store.save_meal(&meal).await?;
    info!(group = %meal.group_id, member = %user_id, date = %meal.date, "Meal cancelled");
    Ok(HttpResponse::Ok().json(json!({ "message": "Meal cancelled" })))
}

#[get("/meals/{group_id}")]
async fn meal_sheet(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    group_id: web::Path<String>,
    query: web::Query<MealSheetQuery>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let group = store.find_group(&group_id).await?;
    auth.require_group_member(&group)?;
    let meals = store.meals_on(&group.id, query.date).await?;
    Ok(HttpResponse::Ok().json(meals))
}
