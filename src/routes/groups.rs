use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use bson::doc;
use chrono::Utc;
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{new_id, queue_best_effort};
use crate::auth::authorize;
use crate::calendar::{MonthParams, MonthPeriod};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::notify;
use crate::schemas::{
    AuditAction, AuditEntry, AuditEntryView, Group, GroupView, MemberId, MonthlyAdjustment,
};
use crate::share::compute_monthly_share;
use crate::store::Store;

#[derive(Deserialize)]
struct GroupNameJson {
    name: String,
}

#[derive(Deserialize)]
struct InviteJson {
    email: String,
}

#[derive(Deserialize)]
struct KickJson {
    member_id: MemberId,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct ActiveDaysJson {
    member_id: MemberId,
    month: u32,
    year: i32,
    active_days: u32,
}

#[post("/groups")]
async fn create_group(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    json: web::Json<GroupNameJson>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let leader = auth.require_member()?.to_string();
    let name = json.into_inner().name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("group name must not be empty"));
    }
    let group = Group {
        id: new_id(),
        name,
        leader: leader.clone(),
        members: vec![leader],
        audit_log: vec![],
    };
    store.groups().insert_one(&group, None).await?;
    info!(group = %group.id, leader = %group.leader, "Group created");
    Ok(HttpResponse::Created().json(GroupView::from(&group)))
}

#[get("/groups")]
async fn list_groups(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    authorize(&req, &config.api_secret)?.require_service()?;
    let groups: Vec<Group> = store.groups().find(doc! {}, None).await?.try_collect().await?;
    let views: Vec<GroupView> = groups.iter().map(GroupView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[delete("/groups/{id}")]
async fn delete_group(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let group = store.find_group(&id).await?;
    auth.require_leader(&group)?;
    store.delete_group(&group.id).await?;
    info!(group = %group.id, by = %auth.actor(), "Group deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Group deleted" })))
}

#[post("/groups/{id}/invite")]
async fn invite_member(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<InviteJson>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let group = store.find_group(&id).await?;
    auth.require_leader(&group)?;

    let email = json.into_inner().email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("email must not be empty"));
    }
    let invitee = store.find_member_by_email(&email).await?;
    let inviter_name = match auth.member_id() {
        Some(member) => store
            .find_member(member)
            .await?
            .map(|m| m.name)
            .unwrap_or_else(|| member.to_string()),
        None => "an administrator".to_string(),
    };

    let mut added = false;
    if let Some(invitee) = &invitee {
        if !group.has_member(&invitee.id) {
            store
                .groups()
                .update_one(
                    doc! { "id": group.id.as_str() },
                    doc! { "$addToSet": { "members": invitee.id.as_str() } },
                    None,
                )
                .await?;
            store
                .append_audit(
                    &group.id,
                    &AuditEntry {
                        action: AuditAction::MemberInvited,
                        performed_by: auth.actor(),
                        description: format!("{} joined by invitation", invitee.id),
                        timestamp: Utc::now(),
                    },
                )
                .await?;
            added = true;
        }
    }

    let notices = notify::invitation(
        &group.name,
        &inviter_name,
        &email,
        invitee.as_ref(),
        &config.frontend_url,
    );
    queue_best_effort(&store, &notices, "invitation").await;
    info!(group = %group.id, added, "Invitation processed");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Invitation processed",
        "added": added,
    })))
}

#[post("/groups/{id}/kick")]
async fn kick_member(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<KickJson>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let group = store.find_group(&id).await?;
    auth.require_leader(&group)?;

    let KickJson { member_id, reason } = json.into_inner();
    if !group.has_member(&member_id) {
        return Err(AppError::not_found("Member", member_id));
    }
    if group.is_leader(&member_id) {
        return Err(AppError::validation("the group leader cannot be removed"));
    }

    store
        .groups()
        .update_one(
            doc! { "id": group.id.as_str() },
            doc! { "$pull": { "members": member_id.as_str() } },
            None,
        )
        .await?;
    let role = if auth.is_service() { "Admin" } else { "Leader" };
    store
        .append_audit(
            &group.id,
            &AuditEntry {
                action: AuditAction::MemberKicked,
                performed_by: auth.actor(),
                description: format!("{member_id} kicked by {role}. Reason: {reason}"),
                timestamp: Utc::now(),
            },
        )
        .await?;

    if let Some(member) = store.find_member(&member_id).await? {
        let notices = notify::removal(&group.name, &reason, &member);
        queue_best_effort(&store, &notices, "removal").await;
    }
    info!(group = %group.id, member = %member_id, "Member removed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Member removed" })))
}

#[get("/groups/{id}/audit")]
async fn audit_log(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let group = store.find_group(&id).await?;
    auth.require_group_member(&group)?;
    let entries: Vec<AuditEntryView> = group.audit_log.iter().map(AuditEntryView::from).collect();
    Ok(HttpResponse::Ok().json(entries))
}

#[put("/groups/{id}/adjustments")]
async fn set_active_days(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<ActiveDaysJson>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let ActiveDaysJson {
        member_id,
        month,
        year,
        active_days,
    } = json.into_inner();
    let period = MonthPeriod::new(year, month)?;
    let total_days_in_month = period.days_in_month();
    if active_days > total_days_in_month {
        return Err(AppError::validation(format!(
            "active days must be between 0 and {total_days_in_month}, got {active_days}"
        )));
    }

    let group = store.find_group(&id).await?;
    auth.require_leader(&group)?;
    if !group.has_member(&member_id) {
        return Err(AppError::not_found("Member", member_id));
    }

    let adjustment = MonthlyAdjustment {
        group_id: group.id.clone(),
        user_id: member_id,
        month: period.month(),
        year: period.year(),
        active_days,
        total_days_in_month,
        modified_by: Some(auth.actor()),
    };
    store.upsert_adjustment(&adjustment).await?;
    store
        .append_audit(
            &group.id,
            &AuditEntry {
                action: AuditAction::AdjustmentSet,
                performed_by: auth.actor(),
                description: format!(
                    "{} active {active_days}/{total_days_in_month} days in {}/{}",
                    adjustment.user_id, period.month(), period.year()
                ),
                timestamp: Utc::now(),
            },
        )
        .await?;
    info!(group = %group.id, member = %adjustment.user_id, active_days, "Adjustment saved");
    Ok(HttpResponse::Ok().json(adjustment))
}

#[get("/groups/{id}/share")]
async fn monthly_share(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    params: web::Query<MonthParams>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let period = MonthPeriod::try_from(params.into_inner())?;
    let snapshot = store.month_snapshot(&id, period).await?;
    if let Some(member) = auth.member_id() {
        if !snapshot.members.iter().any(|m| m.id == member) {
            return Err(AppError::forbidden("not a member of this group"));
        }
    }
    Ok(HttpResponse::Ok().json(compute_monthly_share(&snapshot)))
}

#[post("/groups/{id}/share/notify")]
async fn notify_monthly_share(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<MonthParams>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let period = MonthPeriod::try_from(json.into_inner())?;
    let group = store.find_group(&id).await?;
    auth.require_leader(&group)?;

    let snapshot = store.month_snapshot(&group.id, period).await?;
    let summary = compute_monthly_share(&snapshot);
    let reports = notify::monthly_reports(&summary);
    store.enqueue(&reports).await?;
    info!(
        group = %group.id,
        month = period.month(),
        year = period.year(),
        queued = reports.len(),
        "Monthly reports queued"
    );
    Ok(HttpResponse::Ok().json(summary))
}
