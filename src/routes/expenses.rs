use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use bson::doc;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::new_id;
use crate::auth::{authorize, AuthorizationLevel};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::expenses::{
    summary_pipeline, ExpenseQuery, ExpenseSummary, ExpenseUpdate, NewExpense, SummaryQuery,
};
use crate::schemas::{AuditAction, AuditEntry, Expense, ExpenseView, Group};
use crate::store::Store;

fn require_editor(auth: &AuthorizationLevel, group: &Group, expense: &Expense) -> AppResult<()> {
    match auth.member_id() {
        Some(member) if member == expense.added_by || group.is_leader(member) => Ok(()),
        Some(_) => Err(AppError::forbidden(
            "only the author or the group leader can change this expense",
        )),
        None => Ok(()),
    }
}

#[get("/groups/{id}/expenses/summary")]
async fn expense_summary(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    query: web::Query<SummaryQuery>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let period = query.period()?;
    let group = store.find_group(&id).await?;
    auth.require_group_member(&group)?;

    let total_expenditure = store.sum_amount(summary_pipeline(&group.id, &period)).await?;
    Ok(HttpResponse::Ok().json(ExpenseSummary {
        title: period.title,
        total_expenditure,
        start: period.start,
        end: period.end,
    }))
}

#[get("/groups/{id}/expenses")]
async fn list_expenses(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    query: web::Query<ExpenseQuery>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let filter = query.filter(&id)?;
    let group = store.find_group(&id).await?;
    auth.require_group_member(&group)?;

    let expenses = store.list_expenses(filter, query.sort()).await?;
    let views: Vec<ExpenseView> = expenses.iter().map(ExpenseView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<NewExpense>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let added_by = auth.require_member()?.to_string();
    let expense = json
        .into_inner()
        .into_expense(new_id(), id.into_inner(), added_by)?;

    let group = store.find_group(&expense.group_id).await?;
    auth.require_group_member(&group)?;
    store.expenses().insert_one(&expense, None).await?;
    info!(
        group = %expense.group_id,
        expense = %expense.id,
        amount = expense.amount,
        category = ?expense.category,
        "Expense added"
    );
    Ok(HttpResponse::Created().json(ExpenseView::from(&expense)))
}

#[get("/expenses/{id}")]
async fn get_expense(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let expense = store.find_expense(&id).await?;
    let group = store.find_group(&expense.group_id).await?;
    auth.require_group_member(&group)?;
    Ok(HttpResponse::Ok().json(ExpenseView::from(&expense)))
}

#[put("/expenses/{id}")]
async fn update_expense(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
    json: web::Json<ExpenseUpdate>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let mut expense = store.find_expense(&id).await?;
    let group = store.find_group(&expense.group_id).await?;
    require_editor(&auth, &group, &expense)?;

    json.into_inner().apply(&mut expense, auth.actor())?;
    store
        .expenses()
        .replace_one(doc! { "id": expense.id.as_str() }, &expense, None)
        .await?;
    info!(expense = %expense.id, by = %auth.actor(), "Expense updated");
    Ok(HttpResponse::Ok().json(ExpenseView::from(&expense)))
}

#[delete("/expenses/{id}")]
async fn delete_expense(
    req: HttpRequest,
    store: web::Data<Store>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let auth = authorize(&req, &config.api_secret)?;
    let expense = store.find_expense(&id).await?;
    let group = store.find_group(&expense.group_id).await?;
    require_editor(&auth, &group, &expense)?;

    store
        .expenses()
        .delete_one(doc! { "id": expense.id.as_str() }, None)
        .await?;
    store
        .append_audit(
            &group.id,
            &AuditEntry {
                action: AuditAction::ExpenseDeleted,
                performed_by: auth.actor(),
                description: format!(
                    "{} ({:.2}) added by {} was deleted",
                    expense.product_name, expense.amount, expense.added_by
                ),
                timestamp: Utc::now(),
            },
        )
        .await?;
    info!(expense = %expense.id, by = %auth.actor(), "Expense deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Expense removed" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ExpenseCategory;

    fn fixtures() -> (Group, Expense) {
        let group = Group {
            id: "g1".to_string(),
            name: "Flat 3B".to_string(),
            leader: "ana".to_string(),
            members: vec!["ana".to_string(), "ben".to_string(), "cy".to_string()],
            audit_log: vec![],
        };
        let expense = Expense {
            id: "e1".to_string(),
            group_id: "g1".to_string(),
            product_name: "Bread".to_string(),
            amount: 3.0,
            category: ExpenseCategory::Grocery,
            added_by: "ben".to_string(),
            purchase_date: Utc::now(),
            updated_by: None,
            created_at: Utc::now(),
        };
        (group, expense)
    }

    #[test]
    fn author_leader_and_service_may_edit() {
        let (group, expense) = fixtures();
        for allowed in [
            AuthorizationLevel::Member("ben".to_string()),
            AuthorizationLevel::Member("ana".to_string()),
            AuthorizationLevel::Service,
        ] {
            assert!(require_editor(&allowed, &group, &expense).is_ok());
        }

        let other = AuthorizationLevel::Member("cy".to_string());
        assert!(matches!(
            require_editor(&other, &group, &expense),
            Err(AppError::Forbidden(_))
        ));
    }
}
