use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::schemas::{Meal, MealType, MemberId};

/// Requests must arrive at least this long before the meal is served.
const REQUEST_LEAD_HOURS: i64 = 6;

/// Upper bound on guests a member can bring to a single meal.
pub const MAX_GUEST_MEALS: u32 = 20;

impl MealType {
    pub fn serving_hour(self) -> u32 {
        match self {
            MealType::Breakfast => 8,
            MealType::Lunch => 13,
            MealType::Dinner => 21,
        }
    }

    pub fn request_deadline(self, date: NaiveDate) -> NaiveDateTime {
        let serving = NaiveTime::from_hms_opt(self.serving_hour(), 0, 0).unwrap_or(NaiveTime::MIN);
        date.and_time(serving) - Duration::hours(REQUEST_LEAD_HOURS)
    }
}

pub fn ensure_within_cutoff(
    date: NaiveDate,
    meal_type: MealType,
    now: NaiveDateTime,
    action: &str,
) -> AppResult<()> {
    if now <= meal_type.request_deadline(date) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "{action} for {meal_type:?} must be made at least {REQUEST_LEAD_HOURS} hours in advance"
        )))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MealRequest {
    pub group_id: String,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub self_meal: Option<bool>,
    pub guest_meals: Option<u32>,
}

impl MealRequest {
    pub fn validate(&self) -> AppResult<()> {
        match self.guest_meals {
            Some(guests) if guests > MAX_GUEST_MEALS => Err(AppError::validation(format!(
                "guest meals must be between 0 and {MAX_GUEST_MEALS}, got {guests}"
            ))),
            _ => Ok(()),
        }
    }

    /// Applies the request on top of an existing record, or starts a new one.
    pub fn merge_into(&self, existing: Option<Meal>, user_id: MemberId) -> AppResult<Meal> {
        self.validate()?;
        let mut meal = existing.unwrap_or_else(|| {
            Meal::new(self.group_id.clone(), user_id, self.date, self.meal_type)
        });
        let self_meal = self.self_meal.unwrap_or(meal.self_meal);
        let guest_meals = self.guest_meals.unwrap_or(meal.guest_meals);
        meal.set_portions(self_meal, guest_meals);
        meal.status = Default::default();
        Ok(meal)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MealCancellation {
    pub group_id: String,
    pub date: NaiveDate,
    pub meal_type: MealType,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MealSheetQuery {
    pub date: NaiveDate,
}
