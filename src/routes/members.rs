use actix_web::{delete, get, patch, put, web, HttpRequest, HttpResponse};
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{authorize, AuthorizationLevel};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::schemas::Member;
use crate::store::Store;

#[derive(Deserialize)]
struct MemberProfileJson {
    name: String,
    email: String,
}

/// Partial profile edit. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemberPatchJson {
    name: Option<String>,
    email: Option<String>,
}

impl MemberPatchJson {
    fn into_update(self) -> AppResult<Document> {
        let mut set = Document::new();
        if let Some(name) = self.name {
            set.insert("name", checked_name(&name)?);
        }
        if let Some(email) = self.email {
            set.insert("email", checked_email(&email)?);
        }
        if set.is_empty() {
            return Err(AppError::validation("nothing to update"));
        }
        Ok(doc! { "$set": set })
    }
}

#[derive(Deserialize)]
struct NotificationTokenJson {
    token: Option<String>,
}

fn checked_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("a member needs a name"));
    }
    Ok(name.to_string())
}

fn checked_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::validation(format!("invalid email: {email}")));
    }
    Ok(email)
}

#[get("/members")]
async fn list_members(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    authorize(&req, &config.api_secret)?.require_service()?;
    let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
    let members: Vec<Member> = store
        .members()
        .find(doc! {}, options)
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(members))
}

/// Member records are provisioned by the account service that owns sign-up.
#[put("/members/{id}")]
async fn upsert_member(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<MemberProfileJson>,
) -> AppResult<HttpResponse> {
    authorize(&req, &config.api_secret)?.require_service()?;
    let MemberProfileJson { name, email } = json.into_inner();
    let name = checked_name(&name)?;
    let email = checked_email(&email)?;

    store
        .members()
        .update_one(
            doc! { "id": id.as_str() },
            doc! { "$set": { "name": name.as_str(), "email": email.as_str() } },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;
    info!(member = %id, "Member profile saved");
    Ok(HttpResponse::Ok().json(json!({ "id": id.as_str(), "name": name, "email": email })))
}

#[patch("/members/{id}")]
async fn update_member(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<MemberPatchJson>,
) -> AppResult<HttpResponse> {
    authorize(&req, &config.api_secret)?.require_service()?;
    let update = json.into_inner().into_update()?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let member = store
        .members()
        .find_one_and_update(doc! { "id": id.as_str() }, update, options)
        .await?
        .ok_or_else(|| AppError::not_found("Member", id.as_str()))?;
    info!(member = %member.id, "Member profile updated");
    Ok(HttpResponse::Ok().json(member))
}

#[delete("/members/{id}")]
async fn delete_member(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> AppResult<HttpResponse> {
    authorize(&req, &config.api_secret)?.require_service()?;
    let result = store
        .members()
        .delete_one(doc! { "id": id.as_str() }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Member", id.into_inner()));
    }
    info!(member = %id, "Member removed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Member removed" })))
}

#[put("/members/{id}/notification-token")]
async fn set_notification_token(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<NotificationTokenJson>,
) -> AppResult<HttpResponse> {
    match authorize(&req, &config.api_secret)? {
        AuthorizationLevel::Member(member) if member != id.as_str() => {
            return Err(AppError::forbidden("members can only set their own token"));
        }
        _ => {}
    }

    let token = json.into_inner().token.filter(|t| !t.is_empty());
    let result = store
        .members()
        .update_one(
            doc! { "id": id.as_str() },
            doc! { "$set": { "notification_token": token.as_deref() } },
            None,
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found("Member", id.into_inner()));
    }
    info!(member = %id, registered = token.is_some(), "Notification token updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Token updated" })))
}
