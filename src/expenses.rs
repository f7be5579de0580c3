use bson::{doc, Bson, Document};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{day_window, MonthPeriod};
use crate::error::{AppError, AppResult};
use crate::schemas::{Expense, ExpenseCategory, MemberId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Amount,
    Created,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing filters. The first date filter wins: `day`, then
/// `startDate`..`endDate`, then `month`/`year`. Paired filters must come as a pair.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpenseQuery {
    pub day: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub category: Option<ExpenseCategory>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl ExpenseQuery {
    pub fn date_range(&self) -> AppResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        if self.start_date.is_some() != self.end_date.is_some() {
            return Err(AppError::validation("startDate and endDate must be given together"));
        }
        if self.month.is_some() != self.year.is_some() {
            return Err(AppError::validation("month and year must be given together"));
        }
        if let Some(day) = self.day {
            return Ok(Some(day_window(day, day)));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            return checked_range(start, end).map(Some);
        }
        if let (Some(month), Some(year)) = (self.month, self.year) {
            return Ok(Some(MonthPeriod::new(year, month)?.window()));
        }
        Ok(None)
    }

    pub fn filter(&self, group_id: &str) -> AppResult<Document> {
        let mut filter = doc! { "group_id": group_id };
        if let Some((start, end)) = self.date_range()? {
            filter.insert("purchase_date", date_between(start, end));
        }
        if let Some(category) = self.category {
            filter.insert("category", bson::to_bson(&category)?);
        }
        Ok(filter)
    }

    pub fn sort(&self) -> Document {
        let field = match self.sort_by {
            SortBy::Date => "purchase_date",
            SortBy::Amount => "amount",
            SortBy::Created => "created_at",
        };
        let direction = match self.sort_order {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        };
        let mut sort = Document::new();
        sort.insert(field, direction);
        sort
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    Monthly,
    Yearly,
    Range,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SummaryQuery {
    #[serde(rename = "type")]
    pub kind: SummaryKind,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SummaryPeriod {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseSummary {
    pub title: String,
    pub total_expenditure: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SummaryQuery {
    pub fn period(&self) -> AppResult<SummaryPeriod> {
        match (self.kind, self.month, self.year, self.start_date, self.end_date) {
            (SummaryKind::Monthly, Some(month), Some(year), _, _) => {
                let period = MonthPeriod::new(year, month)?;
                let (start, end) = period.window();
                Ok(SummaryPeriod {
                    title: format!("Monthly Summary: {}", period.first_day().format("%B %Y")),
                    start,
                    end,
                })
            }
            (SummaryKind::Yearly, _, Some(year), _, _) => {
                let first = MonthPeriod::new(year, 1)?.first_day();
                let last = MonthPeriod::new(year, 12)?.last_day();
                let (start, end) = day_window(first, last);
                Ok(SummaryPeriod {
                    title: format!("Yearly Summary: {year}"),
                    start,
                    end,
                })
            }
            (SummaryKind::Range, _, _, Some(first), Some(last)) => {
                let (start, end) = checked_range(first, last)?;
                Ok(SummaryPeriod {
                    title: format!("Range Summary: {first} to {last}"),
                    start,
                    end,
                })
            }
            _ => Err(AppError::validation(
                "invalid summary type or missing date parameters",
            )),
        }
    }
}

/// Aggregation pipeline summing every expense of a group inside the period.
pub fn summary_pipeline(group_id: &str, period: &SummaryPeriod) -> Vec<Document> {
    vec![
        doc! { "$match": {
            "group_id": group_id,
            "purchase_date": date_between(period.start, period.end),
        }},
        doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$amount" } } },
    ]
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewExpense {
    pub product_name: String,
    pub amount: f64,
    pub purchase_date: DateTime<Utc>,
    #[serde(default)]
    pub category: ExpenseCategory,
}

impl NewExpense {
    pub fn into_expense(self, id: String, group_id: String, added_by: MemberId) -> AppResult<Expense> {
        validate_name(&self.product_name)?;
        validate_amount(self.amount)?;
        Ok(Expense {
            id,
            group_id,
            product_name: self.product_name.trim().to_string(),
            amount: self.amount,
            category: self.category,
            added_by,
            purchase_date: self.purchase_date,
            updated_by: None,
            created_at: Utc::now(),
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExpenseUpdate {
    pub product_name: Option<String>,
    pub amount: Option<f64>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub category: Option<ExpenseCategory>,
}

impl ExpenseUpdate {
    pub fn apply(self, expense: &mut Expense, updated_by: MemberId) -> AppResult<()> {
        if let Some(name) = self.product_name {
            validate_name(&name)?;
            expense.product_name = name.trim().to_string();
        }
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
            expense.amount = amount;
        }
        if let Some(purchase_date) = self.purchase_date {
            expense.purchase_date = purchase_date;
        }
        if let Some(category) = self.category {
            expense.category = category;
        }
        expense.updated_by = Some(updated_by);
        Ok(())
    }
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::validation("product name must not be empty"));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> AppResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::validation(format!(
            "amount must be a non-negative number, got {amount}"
        )));
    }
    Ok(())
}

fn checked_range(first: NaiveDate, last: NaiveDate) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    if last < first {
        return Err(AppError::validation(format!(
            "end date {last} is before start date {first}"
        )));
    }
    Ok(day_window(first, last))
}

pub fn date_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Document {
    doc! {
        "$gte": bson::DateTime::from_chrono(start),
        "$lte": bson::DateTime::from_chrono(end),
    }
}
