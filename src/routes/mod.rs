use actix_web::web;
use bson::oid::ObjectId;
use tracing::warn;

use crate::notify::Notification;
use crate::store::Store;

mod expenses;
mod groups;
mod meals;
mod members;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(members::list_members)
        .service(members::upsert_member)
        .service(members::update_member)
        .service(members::delete_member)
        .service(members::set_notification_token)
        .service(groups::create_group)
        .service(groups::list_groups)
        .service(groups::delete_group)
        .service(groups::invite_member)
        .service(groups::kick_member)
        .service(groups::audit_log)
        .service(groups::set_active_days)
        .service(groups::monthly_share)
        .service(groups::notify_monthly_share)
        .service(expenses::expense_summary)
        .service(expenses::list_expenses)
        .service(expenses::add_expense)
        .service(expenses::get_expense)
        .service(expenses::update_expense)
        .service(expenses::delete_expense)
        .service(meals::request_meal)
        .service(meals::cancel_meal)
        .service(meals::meal_sheet);
}

fn new_id() -> String {
    ObjectId::new().to_hex()
}

/// Queues notices whose loss should not fail the request that triggered them.
async fn queue_best_effort(store: &Store, notifications: &[Notification], context: &str) {
    if let Err(err) = store.enqueue(notifications).await {
        warn!("Failed to queue {context} notifications: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sign_member_token;
    use crate::config::Config;
    use actix_web::{http::StatusCode, test, App};
    use mongodb::Client;
    use serde_json::json;

    const SECRET: &str = "s3cret";

    // The client connects lazily, so these requests must fail before touching storage.
    async fn store() -> Store {
        let client = Client::with_uri_str("mongodb://127.0.0.1:27017")
            .await
            .unwrap();
        Store::new(client.database("GroceryShareTest"))
    }

    fn config() -> Config {
        Config {
            mongodb_uri: "mongodb://127.0.0.1:27017".to_string(),
            database_name: "GroceryShareTest".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            api_secret: SECRET.to_string(),
            cors_origin: None,
            frontend_url: "http://localhost:3000".to_string(),
        }
    }

    #[actix_web::test]
    async fn share_requires_authorization() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/groups/g1/share?month=4&year=2024")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn share_rejects_malformed_month_before_reading() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/groups/g1/share?month=13&year=2024")
            .insert_header(("Authorization", SECRET))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("month"));
    }

    #[actix_web::test]
    async fn negative_expense_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/groups/g1/expenses")
            .insert_header(("Authorization", sign_member_token("ana", "1714000000", SECRET)))
            .set_json(json!({
                "product_name": "Rice",
                "amount": -3.0,
                "purchase_date": "2024-04-02T10:00:00Z",
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn listing_groups_needs_the_service_secret() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/groups")
            .insert_header(("Authorization", sign_member_token("ana", "1714000000", SECRET)))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn late_meal_request_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/meals")
            .insert_header(("Authorization", sign_member_token("ana", "1714000000", SECRET)))
            .set_json(json!({
                "group_id": "g1",
                "date": "2000-01-01",
                "meal_type": "Dinner",
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn member_administration_is_service_only() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;
        let token = sign_member_token("ana", "1714000000", SECRET);

        let request = test::TestRequest::get()
            .uri("/members")
            .insert_header(("Authorization", token.clone()))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = test::TestRequest::delete()
            .uri("/members/ben")
            .insert_header(("Authorization", token))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn empty_member_patch_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::patch()
            .uri("/members/ben")
            .insert_header(("Authorization", SECRET))
            .set_json(json!({}))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn oversized_guest_count_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/meals")
            .insert_header(("Authorization", sign_member_token("ana", "1714000000", SECRET)))
            .set_json(json!({
                "group_id": "g1",
                "date": "2999-01-01",
                "meal_type": "Dinner",
                "guest_meals": 4294967295u64,
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn expense_listing_rejects_partial_or_unknown_filters() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store().await))
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        for uri in [
            "/groups/g1/expenses?startDate=2024-04-01",
            "/groups/g1/expenses?start_date=2024-04-01&end_date=2024-04-05",
        ] {
            let request = test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", SECRET))
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }
}
