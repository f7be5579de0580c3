//! Message formatting for the notification outbox.
//!
//! Notifications are written to a collection and picked up by an external
//! delivery worker (push and email). Amounts are rounded here and nowhere else.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::MonthPeriod;
use crate::schemas::{Meal, Member, MemberId};
use crate::share::{MemberShare, MonthlySummary};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum Channel {
    Push { token: String },
    Email { address: String },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Notification {
    pub recipient: Option<MemberId>,
    pub channel: Channel,
    pub subject: String,
    pub body: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn new(recipient: Option<&str>, channel: Channel, subject: String, body: String) -> Self {
        Self {
            recipient: recipient.map(str::to_string),
            channel,
            subject,
            body,
            created_at: Utc::now(),
        }
    }

    fn push(member: &Member, subject: &str, body: &str) -> Option<Self> {
        member
            .notification_token
            .as_ref()
            .filter(|token| !token.is_empty())
            .map(|token| {
                Self::new(
                    Some(&member.id),
                    Channel::Push {
                        token: token.clone(),
                    },
                    subject.to_string(),
                    body.to_string(),
                )
            })
    }

    fn email(recipient: Option<&str>, address: &str, subject: String, body: String) -> Self {
        Self::new(
            recipient,
            Channel::Email {
                address: address.to_string(),
            },
            subject,
            body,
        )
    }
}

/// Escape user-supplied text for an HTML email body
fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn monthly_report_text(period: MonthPeriod, share: &MemberShare) -> String {
    format!(
        "Your {}/{} Bill: Total ${:.0} (Shared: ${:.0}, Personal: ${:.0}) Active Days: {}",
        period.month(),
        period.year(),
        share.total_to_pay,
        share.shared_cost,
        share.personal_cost,
        share.active_days
    )
}

pub fn monthly_reports(summary: &MonthlySummary) -> Vec<Notification> {
    let period = summary.period;
    let mut notifications = Vec::new();
    for share in &summary.members {
        let text = monthly_report_text(period, share);
        if let Some(token) = share.notification_token.as_ref().filter(|t| !t.is_empty()) {
            notifications.push(Notification::new(
                Some(&share.user_id),
                Channel::Push {
                    token: token.clone(),
                },
                "Monthly Expense Report".to_string(),
                text.clone(),
            ));
        }
        if share.email.is_empty() {
            continue;
        }
        let body = format!(
            "<h1>Monthly Report</h1>\n<p>{text}</p>\n<ul>\n\
             <li>Shared Cost: ${:.2}</li>\n\
             <li>Personal Cost: ${:.2}</li>\n\
             <li><strong>Total: ${:.2}</strong></li>\n</ul>",
            share.shared_cost, share.personal_cost, share.total_to_pay
        );
        notifications.push(Notification::email(
            Some(&share.user_id),
            &share.email,
            format!("Monthly Expense Report - {}/{}", period.month(), period.year()),
            body,
        ));
    }
    notifications
}

pub fn invitation(
    group_name: &str,
    inviter_name: &str,
    email: &str,
    invitee: Option<&Member>,
    frontend_url: &str,
) -> Vec<Notification> {
    let link = escape_html(&format!("{}/login", frontend_url.trim_end_matches('/')));
    let body = format!(
        "<h1>Group Invitation</h1>\n\
         <p>You have been invited to join the group <strong>{}</strong> by {}.</p>\n\
         <p>Please log in to your account to accept the invitation.</p>\n\
         <a href=\"{link}\">Go to App</a>",
        escape_html(group_name),
        escape_html(inviter_name),
    );
    let mut notifications = vec![Notification::email(
        invitee.map(|m| m.id.as_str()),
        email,
        format!("Invitation to join {group_name}"),
        body,
    )];
    notifications.extend(invitee.and_then(|member| {
        Notification::push(
            member,
            "Group Invitation",
            &format!("You have been invited to join {group_name}"),
        )
    }));
    notifications
}

pub fn removal(group_name: &str, reason: &str, member: &Member) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = Notification::push(
        member,
        "Removed from Group",
        &format!("You were removed from {group_name}. Reason: {reason}"),
    )
    .into_iter()
    .collect();
    notifications.push(Notification::email(
        Some(&member.id),
        &member.email,
        format!("Removed from {group_name}"),
        format!(
            "<p>You have been removed from the group <strong>{}</strong>.</p>\
             <p>Reason: {}</p>",
            escape_html(group_name),
            escape_html(reason),
        ),
    ));
    notifications
}

pub fn meal_update(leader: &Member, requester_name: &str, meal: &Meal) -> Vec<Notification> {
    let text = format!(
        "{requester_name} updated {:?} for {}: Self={}, Guests={}",
        meal.meal_type, meal.date, meal.self_meal, meal.guest_meals
    );
    let mut notifications: Vec<Notification> =
        Notification::push(leader, "Meal Request Update", &text)
            .into_iter()
            .collect();
    let status = if meal.self_meal { "Eating" } else { "Not Eating" };
    notifications.push(Notification::email(
        Some(&leader.id),
        &leader.email,
        format!("Meal Request: {requester_name} - {:?}", meal.meal_type),
        format!(
            "<h3>Meal Request Update</h3>\n\
             <p><strong>Member:</strong> {}</p>\n\
             <p><strong>Date:</strong> {}</p>\n\
             <p><strong>Meal:</strong> {:?}</p>\n\
             <p><strong>Status:</strong> {status}</p>\n\
             <p><strong>Guest Meals:</strong> {}</p>",
            escape_html(requester_name),
            meal.date.format("%a %b %d %Y"),
            meal.meal_type,
            meal.guest_meals
        ),
    ));
    notifications
}
