//! Monthly shared-cost allocation.
//!
//! Shared expenses (every category except `Personal`) are pooled and divided by
//! the total number of active member-days in the month. Each member then pays
//! `active_days * cost_per_day` plus their own personal expenses.
//! Nothing is rounded here; presentation code rounds.

use std::collections::HashMap;

use serde::Serialize;

use crate::calendar::{MonthPeriod, MISSING_ADJUSTMENT_POLICY};
use crate::schemas::{Expense, Member, MemberId, MonthlyAdjustment};

/// Everything the calculator reads, fetched up front for one group and month.
#[derive(Clone, Debug)]
pub struct MonthSnapshot {
    pub period: MonthPeriod,
    pub members: Vec<Member>,
    pub expenses: Vec<Expense>,
    pub adjustments: Vec<MonthlyAdjustment>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemberShare {
    pub user_id: MemberId,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub notification_token: Option<String>,
    pub active_days: u32,
    pub days_in_month: u32,
    pub shared_cost: f64,
    pub personal_cost: f64,
    pub total_to_pay: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlySummary {
    #[serde(skip)]
    pub period: MonthPeriod,
    pub month: u32,
    pub year: i32,
    pub total_shared_amount: f64,
    pub cost_per_day: f64,
    pub members: Vec<MemberShare>,
}

pub fn compute_monthly_share(snapshot: &MonthSnapshot) -> MonthlySummary {
    let period = snapshot.period;
    let days_in_month = period.days_in_month();

    let mut total_shared_amount = 0.0;
    let mut personal: HashMap<&str, f64> = HashMap::new();
    for expense in snapshot
        .expenses
        .iter()
        .filter(|e| period.contains(e.purchase_date.date_naive()))
    {
        if expense.category.is_shared() {
            total_shared_amount += expense.amount;
        } else {
            *personal.entry(expense.added_by.as_str()).or_insert(0.0) += expense.amount;
        }
    }

    let adjusted: HashMap<&str, u32> = snapshot
        .adjustments
        .iter()
        .filter(|a| a.month == period.month() && a.year == period.year())
        .map(|a| (a.user_id.as_str(), a.active_days))
        .collect();

    let active_days: Vec<u32> = snapshot
        .members
        .iter()
        .map(|member| {
            adjusted
                .get(member.id.as_str())
                .copied()
                .unwrap_or_else(|| MISSING_ADJUSTMENT_POLICY.active_days(period))
        })
        .collect();
    let total_group_active_days: u64 = active_days.iter().map(|&d| u64::from(d)).sum();

    let cost_per_day = if total_group_active_days == 0 {
        0.0
    } else {
        total_shared_amount / total_group_active_days as f64
    };

    let members = snapshot
        .members
        .iter()
        .zip(active_days)
        .map(|(member, active_days)| {
            let shared_cost = f64::from(active_days) * cost_per_day;
            let personal_cost = personal.get(member.id.as_str()).copied().unwrap_or(0.0);
            MemberShare {
                user_id: member.id.clone(),
                name: member.name.clone(),
                email: member.email.clone(),
                notification_token: member.notification_token.clone(),
                active_days,
                days_in_month,
                shared_cost,
                personal_cost,
                total_to_pay: shared_cost + personal_cost,
            }
        })
        .collect();

    MonthlySummary {
        month: period.month(),
        year: period.year(),
        period,
        total_shared_amount,
        cost_per_day,
        members,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ExpenseCategory;
    use chrono::{TimeZone, Utc};

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_uppercase(),
            email: format!("{id}@example.com"),
            notification_token: None,
        }
    }

    fn expense(added_by: &str, amount: f64, category: ExpenseCategory, day: u32) -> Expense {
        let purchase_date = Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap();
        Expense {
            id: format!("{added_by}-{day}-{amount}"),
            group_id: "g1".to_string(),
            product_name: "item".to_string(),
            amount,
            category,
            added_by: added_by.to_string(),
            purchase_date,
            updated_by: None,
            created_at: purchase_date,
        }
    }

    fn adjustment(user_id: &str, active_days: u32) -> MonthlyAdjustment {
        MonthlyAdjustment {
            group_id: "g1".to_string(),
            user_id: user_id.to_string(),
            month: 4,
            year: 2024,
            active_days,
            total_days_in_month: 30,
            modified_by: None,
        }
    }

    // April 2024 has 30 days.
    fn april(
        members: &[&str],
        expenses: Vec<Expense>,
        adjustments: Vec<MonthlyAdjustment>,
    ) -> MonthSnapshot {
        MonthSnapshot {
            period: MonthPeriod::new(2024, 4).unwrap(),
            members: members.iter().map(|m| member(m)).collect(),
            expenses,
            adjustments,
        }
    }

    fn share<'a>(summary: &'a MonthlySummary, id: &str) -> &'a MemberShare {
        summary.members.iter().find(|m| m.user_id == id).unwrap()
    }

    #[test]
    fn splits_evenly_without_adjustments() {
        let summary = compute_monthly_share(&april(
            &["a", "b"],
            vec![expense("a", 3000.0, ExpenseCategory::Rent, 1)],
            vec![],
        ));

        assert_eq!(summary.period, MonthPeriod::new(2024, 4).unwrap());
        assert_eq!((summary.month, summary.year), (4, 2024));
        assert_eq!(summary.total_shared_amount, 3000.0);
        assert_eq!(summary.cost_per_day, 50.0);
        assert_eq!(share(&summary, "a").shared_cost, 1500.0);
        assert_eq!(share(&summary, "b").shared_cost, 1500.0);
        assert_eq!(share(&summary, "b").active_days, 30);
        assert_eq!(share(&summary, "b").days_in_month, 30);
    }

    #[test]
    fn adjustment_redistributes_the_pool() {
        let summary = compute_monthly_share(&april(
            &["a", "b"],
            vec![expense("b", 3000.0, ExpenseCategory::Grocery, 3)],
            vec![adjustment("a", 10)],
        ));

        assert_eq!(summary.total_shared_amount, 3000.0);
        assert_eq!(summary.cost_per_day, 75.0);
        assert_eq!(share(&summary, "a").shared_cost, 750.0);
        assert_eq!(share(&summary, "b").shared_cost, 2250.0);
    }

    #[test]
    fn zero_active_days_charge_only_personal_costs() {
        let summary = compute_monthly_share(&april(
            &["a", "b"],
            vec![
                expense("a", 900.0, ExpenseCategory::Utility, 2),
                expense("b", 40.0, ExpenseCategory::Personal, 2),
            ],
            vec![adjustment("a", 0), adjustment("b", 0)],
        ));

        assert_eq!(summary.cost_per_day, 0.0);
        for m in &summary.members {
            assert_eq!(m.shared_cost, 0.0);
            assert!(m.total_to_pay.is_finite());
        }
        assert_eq!(share(&summary, "b").personal_cost, 40.0);
        assert_eq!(share(&summary, "b").total_to_pay, 40.0);
    }

    #[test]
    fn empty_group_distributes_nothing() {
        let summary = compute_monthly_share(&april(
            &[],
            vec![expense("x", 120.0, ExpenseCategory::Other, 9)],
            vec![],
        ));

        assert!(summary.members.is_empty());
        assert_eq!(summary.total_shared_amount, 120.0);
        assert_eq!(summary.cost_per_day, 0.0);
    }

    #[test]
    fn personal_expenses_stay_with_their_author() {
        let summary = compute_monthly_share(&april(
            &["a", "b"],
            vec![
                expense("a", 60.0, ExpenseCategory::Grocery, 4),
                expense("a", 25.5, ExpenseCategory::Personal, 5),
                expense("a", 4.5, ExpenseCategory::Personal, 6),
            ],
            vec![],
        ));

        assert_eq!(summary.total_shared_amount, 60.0);
        let a = share(&summary, "a");
        let b = share(&summary, "b");
        assert_eq!(a.personal_cost, 30.0);
        assert_eq!(b.personal_cost, 0.0);
        assert_eq!(a.total_to_pay, a.shared_cost + a.personal_cost);
        assert_eq!(b.total_to_pay, b.shared_cost);
    }

    #[test]
    fn shared_costs_add_up_to_the_pool() {
        let summary = compute_monthly_share(&april(
            &["a", "b", "c"],
            vec![
                expense("a", 100.0, ExpenseCategory::Grocery, 1),
                expense("c", 33.33, ExpenseCategory::Utility, 15),
            ],
            vec![adjustment("b", 7), adjustment("c", 19)],
        ));

        let distributed: f64 = summary.members.iter().map(|m| m.shared_cost).sum();
        assert!((distributed - summary.total_shared_amount).abs() < 1e-9);
        for m in &summary.members {
            assert_eq!(m.total_to_pay, m.shared_cost + m.personal_cost);
        }
    }

    #[test]
    fn changing_one_adjustment_moves_every_share() {
        let expenses = vec![expense("a", 1200.0, ExpenseCategory::Rent, 1)];
        let before = compute_monthly_share(&april(&["a", "b", "c"], expenses.clone(), vec![]));
        let after = compute_monthly_share(&april(
            &["a", "b", "c"],
            expenses,
            vec![adjustment("a", 15)],
        ));

        assert_eq!(before.total_shared_amount, after.total_shared_amount);
        assert!(after.cost_per_day > before.cost_per_day);
        assert!(share(&after, "b").shared_cost > share(&before, "b").shared_cost);
        assert!(share(&after, "a").shared_cost < share(&before, "a").shared_cost);
    }

    #[test]
    fn ignores_records_outside_the_month() {
        let mut snapshot = april(&["a"], vec![], vec![]);
        let mut may = expense("a", 500.0, ExpenseCategory::Grocery, 1);
        may.purchase_date = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        snapshot.expenses.push(may);
        let mut march_adjustment = adjustment("a", 3);
        march_adjustment.month = 3;
        snapshot.adjustments.push(march_adjustment);

        let summary = compute_monthly_share(&snapshot);
        assert_eq!(summary.total_shared_amount, 0.0);
        assert_eq!(share(&summary, "a").active_days, 30);
    }
}
