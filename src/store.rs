use std::collections::HashMap;

use bson::{doc, Document};
use chrono::NaiveDate;
use futures::TryStreamExt;
use mongodb::{
    options::{FindOptions, IndexOptions, ReplaceOptions, UpdateOptions},
    Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::calendar::MonthPeriod;
use crate::error::{AppError, AppResult};
use crate::expenses::date_between;
use crate::notify::Notification;
use crate::schemas::{
    AuditEntry, Expense, Group, Meal, MealType, Member, MemberId, MonthlyAdjustment,
};
use crate::share::MonthSnapshot;

const MEMBERS: &str = "Members";
const GROUPS: &str = "Groups";
const EXPENSES: &str = "Expenses";
const ADJUSTMENTS: &str = "Adjustments";
const MEALS: &str = "Meals";
const NOTIFICATIONS: &str = "Notifications";

/// Collections whose documents belong to a single group through `group_id`.
const GROUP_SCOPED: [&str; 3] = [EXPENSES, ADJUSTMENTS, MEALS];

#[derive(Clone, Debug)]
pub struct Store {
    db: Database,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn members(&self) -> Collection<Member> {
        self.db.collection(MEMBERS)
    }

    pub fn groups(&self) -> Collection<Group> {
        self.db.collection(GROUPS)
    }

    pub fn expenses(&self) -> Collection<Expense> {
        self.db.collection(EXPENSES)
    }

    pub fn adjustments(&self) -> Collection<MonthlyAdjustment> {
        self.db.collection(ADJUSTMENTS)
    }

    pub fn meals(&self) -> Collection<Meal> {
        self.db.collection(MEALS)
    }

    pub fn notifications(&self) -> Collection<Notification> {
        self.db.collection(NOTIFICATIONS)
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.members()
            .create_index(unique_index(doc! { "id": 1 }, unique()), None)
            .await?;
        self.groups()
            .create_index(unique_index(doc! { "id": 1 }, unique()), None)
            .await?;
        self.expenses()
            .create_index(unique_index(doc! { "id": 1 }, unique()), None)
            .await?;
        self.expenses()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "group_id": 1, "purchase_date": -1 })
                    .build(),
                None,
            )
            .await?;
        self.adjustments()
            .create_index(
                unique_index(
                    doc! { "group_id": 1, "user_id": 1, "month": 1, "year": 1 },
                    unique(),
                ),
                None,
            )
            .await?;
        self.meals()
            .create_index(
                unique_index(
                    doc! { "group_id": 1, "user_id": 1, "date": 1, "meal_type": 1 },
                    unique(),
                ),
                None,
            )
            .await?;
        info!("Indexes ensured");
        Ok(())
    }

    pub async fn find_group(&self, id: &str) -> AppResult<Group> {
        let found = self.groups().find_one(doc! { "id": id }, None).await?;
        require_found("Group", id, found)
    }

    pub async fn find_expense(&self, id: &str) -> AppResult<Expense> {
        let found = self.expenses().find_one(doc! { "id": id }, None).await?;
        require_found("Expense", id, found)
    }

    pub async fn find_member(&self, id: &str) -> AppResult<Option<Member>> {
        Ok(self.members().find_one(doc! { "id": id }, None).await?)
    }

    pub async fn find_member_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        Ok(self.members().find_one(doc! { "email": email }, None).await?)
    }

    /// Profiles for the given ids, in the same order. Ids without a stored
    /// profile still get an entry so they keep their place in cost splits.
    pub async fn members_by_ids(&self, ids: &[MemberId]) -> AppResult<Vec<Member>> {
        let found: Vec<Member> = collect(
            &self.members(),
            doc! { "id": { "$in": ids.to_vec() } },
            None,
        )
        .await?;
        let mut by_id: HashMap<String, Member> =
            found.into_iter().map(|m| (m.id.clone(), m)).collect();
        Ok(ids
            .iter()
            .map(|id| {
                by_id.remove(id).unwrap_or_else(|| Member {
                    id: id.clone(),
                    name: String::new(),
                    email: String::new(),
                    notification_token: None,
                })
            })
            .collect())
    }

    pub async fn list_expenses(
        &self,
        filter: Document,
        sort: Document,
    ) -> AppResult<Vec<Expense>> {
        let options = FindOptions::builder().sort(sort).build();
        collect(&self.expenses(), filter, Some(options)).await
    }

    pub async fn sum_amount(&self, pipeline: Vec<Document>) -> AppResult<f64> {
        let results: Vec<Document> = self
            .expenses()
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;
        Ok(results
            .first()
            .and_then(|d| d.get("total"))
            .and_then(|total| total.as_f64().or_else(|| total.as_i64().map(|v| v as f64)))
            .unwrap_or(0.0))
    }

    /// Reads everything the share calculator needs for one group and month.
    pub async fn month_snapshot(&self, group_id: &str, period: MonthPeriod) -> AppResult<MonthSnapshot> {
        let group = self.find_group(group_id).await?;
        let members = self.members_by_ids(&group.members).await?;

        let (start, end) = period.window();
        let expenses = collect(
            &self.expenses(),
            doc! { "group_id": group_id, "purchase_date": date_between(start, end) },
            None,
        )
        .await?;
        let adjustments = collect(
            &self.adjustments(),
            doc! {
                "group_id": group_id,
                "month": i64::from(period.month()),
                "year": period.year(),
            },
            None,
        )
        .await?;
        debug!(
            group = group_id,
            members = members.len(),
            expenses = expenses.len(),
            adjustments = adjustments.len(),
            "Loaded month snapshot"
        );

        Ok(MonthSnapshot {
            period,
            members,
            expenses,
            adjustments,
        })
    }

    pub async fn upsert_adjustment(&self, adjustment: &MonthlyAdjustment) -> AppResult<()> {
        self.adjustments()
            .update_one(
                doc! {
                    "group_id": adjustment.group_id.as_str(),
                    "user_id": adjustment.user_id.as_str(),
                    "month": i64::from(adjustment.month),
                    "year": adjustment.year,
                },
                doc! { "$set": {
                    "active_days": i64::from(adjustment.active_days),
                    "total_days_in_month": i64::from(adjustment.total_days_in_month),
                    "modified_by": adjustment.modified_by.as_deref(),
                }},
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    pub async fn find_meal(&self, key: &MealKey<'_>) -> AppResult<Option<Meal>> {
        Ok(self.meals().find_one(key.filter(), None).await?)
    }

    pub async fn save_meal(&self, meal: &Meal) -> AppResult<()> {
        let key = MealKey {
            group_id: &meal.group_id,
            user_id: &meal.user_id,
            date: meal.date,
            meal_type: meal.meal_type,
        };
        self.meals()
            .replace_one(
                key.filter(),
                meal,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    pub async fn meals_on(&self, group_id: &str, date: NaiveDate) -> AppResult<Vec<Meal>> {
        collect(
            &self.meals(),
            doc! { "group_id": group_id, "date": date.to_string() },
            None,
        )
        .await
    }

    /// Removes a group together with every record scoped to it.
    pub async fn delete_group(&self, group_id: &str) -> AppResult<()> {
        for name in GROUP_SCOPED {
            let result = self
                .db
                .collection::<Document>(name)
                .delete_many(group_filter(group_id), None)
                .await?;
            debug!(
                group = group_id,
                collection = name,
                deleted = result.deleted_count,
                "Removed group records"
            );
        }
        self.groups().delete_one(doc! { "id": group_id }, None).await?;
        Ok(())
    }

    pub async fn append_audit(&self, group_id: &str, entry: &AuditEntry) -> AppResult<()> {
        self.groups()
            .update_one(
                doc! { "id": group_id },
                doc! { "$push": { "audit_log": bson::to_bson(entry)? } },
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn enqueue(&self, notifications: &[Notification]) -> AppResult<()> {
        if notifications.is_empty() {
            return Ok(());
        }
        self.notifications().insert_many(notifications, None).await?;
        debug!(count = notifications.len(), "Queued notifications");
        Ok(())
    }
}

/// Identity of a meal record: one per member, group, date and meal type.
pub struct MealKey<'a> {
    pub group_id: &'a str,
    pub user_id: &'a str,
    pub date: NaiveDate,
    pub meal_type: MealType,
}

impl MealKey<'_> {
    fn filter(&self) -> Document {
        doc! {
            "group_id": self.group_id,
            "user_id": self.user_id,
            "date": self.date.to_string(),
            "meal_type": format!("{:?}", self.meal_type),
        }
    }
}

fn group_filter(group_id: &str) -> Document {
    doc! { "group_id": group_id }
}

fn require_found<T>(entity: &'static str, id: &str, found: Option<T>) -> AppResult<T> {
    found.ok_or_else(|| AppError::not_found(entity, id))
}

fn unique_index(keys: Document, options: IndexOptions) -> IndexModel {
    IndexModel::builder().keys(keys).options(options).build()
}

async fn collect<T>(
    collection: &Collection<T>,
    filter: Document,
    options: Option<FindOptions>,
) -> AppResult<Vec<T>>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    Ok(collection.find(filter, options).await?.try_collect().await?)
}
