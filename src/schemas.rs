use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type MemberId = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub notification_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub leader: MemberId,
    pub members: Vec<MemberId>,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
}

/// Group as returned by the API; the audit log has its own endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupView<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub leader: &'a str,
    pub members: &'a [MemberId],
}

impl<'a> From<&'a Group> for GroupView<'a> {
    fn from(group: &'a Group) -> Self {
        Self {
            id: &group.id,
            name: &group.name,
            leader: &group.leader,
            members: &group.members,
        }
    }
}

impl Group {
    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    pub fn is_leader(&self, member: &str) -> bool {
        self.leader == member
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum AuditAction {
    MemberInvited,
    MemberKicked,
    ExpenseDeleted,
    AdjustmentSet,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub performed_by: MemberId,
    pub description: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

/// JSON shape of an audit entry; the stored form keeps BSON dates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditEntryView<'a> {
    pub action: AuditAction,
    pub performed_by: &'a str,
    pub description: &'a str,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a AuditEntry> for AuditEntryView<'a> {
    fn from(entry: &'a AuditEntry) -> Self {
        Self {
            action: entry.action,
            performed_by: &entry.performed_by,
            description: &entry.description,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ExpenseCategory {
    #[default]
    Grocery,
    Utility,
    Rent,
    Personal,
    Other,
}

impl ExpenseCategory {
    pub fn is_shared(self) -> bool {
        self != ExpenseCategory::Personal
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: String,
    pub group_id: String,
    pub product_name: String,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub added_by: MemberId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub purchase_date: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<MemberId>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseView<'a> {
    pub id: &'a str,
    pub group_id: &'a str,
    pub product_name: &'a str,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub added_by: &'a str,
    pub purchase_date: DateTime<Utc>,
    pub updated_by: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a Expense> for ExpenseView<'a> {
    fn from(expense: &'a Expense) -> Self {
        Self {
            id: &expense.id,
            group_id: &expense.group_id,
            product_name: &expense.product_name,
            amount: expense.amount,
            category: expense.category,
            added_by: &expense.added_by,
            purchase_date: expense.purchase_date,
            updated_by: expense.updated_by.as_deref(),
            created_at: expense.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MonthlyAdjustment {
    pub group_id: String,
    pub user_id: MemberId,
    pub month: u32,
    pub year: i32,
    pub active_days: u32,
    pub total_days_in_month: u32,
    #[serde(default)]
    pub modified_by: Option<MemberId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum MealStatus {
    #[default]
    Requested,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Meal {
    pub group_id: String,
    pub user_id: MemberId,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub self_meal: bool,
    pub guest_meals: u32,
    pub total_quantity: u32,
    pub status: MealStatus,
}

impl Meal {
    pub fn new(group_id: String, user_id: MemberId, date: NaiveDate, meal_type: MealType) -> Self {
        Self {
            group_id,
            user_id,
            date,
            meal_type,
            self_meal: true,
            guest_meals: 0,
            total_quantity: 1,
            status: MealStatus::Requested,
        }
    }

    pub fn set_portions(&mut self, self_meal: bool, guest_meals: u32) {
        self.self_meal = self_meal;
        self.guest_meals = guest_meals;
        self.total_quantity = u32::from(self_meal) + guest_meals;
    }

    pub fn cancel(&mut self) {
        self.set_portions(false, 0);
        self.status = MealStatus::Cancelled;
    }
}
