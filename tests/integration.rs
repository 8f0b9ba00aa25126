use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use parcel_desk::api::rest::router;
use parcel_desk::config::Config;
use parcel_desk::gateway::signature;
use parcel_desk::notify::{Dispatcher, Notification, Notifier, NotifyError};
use parcel_desk::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SERVER_KEY: &str = "test-server-key";

struct Harness {
    app: axum::Router,
    state: Arc<AppState>,
    admin: Uuid,
}

fn setup_with(dispatcher: Dispatcher) -> Harness {
    let config = Config {
        payment_server_key: SERVER_KEY.to_string(),
        ..Config::default()
    };
    let state = Arc::new(AppState::new(&config).with_notifications(dispatcher));
    Harness {
        app: router(state.clone()),
        state,
        admin: Uuid::new_v4(),
    }
}

fn setup() -> Harness {
    setup_with(Dispatcher::default())
}

fn request(method: &str, uri: &str, actor: Option<(Uuid, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        builder = builder
            .header("x-actor-id", id.to_string())
            .header("x-actor-role", role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

impl Harness {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn as_admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(request(method, uri, Some((self.admin, "admin")), body))
            .await
    }

    async fn create_location(&self, body: Value) -> Value {
        let (status, location) = self.as_admin("POST", "/locations", Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{location}");
        location
    }

    async fn create_resident(&self, name: &str, phone: &str) -> Uuid {
        let (status, user) = self
            .as_admin(
                "POST",
                "/users",
                Some(json!({ "name": name, "phone": phone, "unit": "12B" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{user}");
        Uuid::parse_str(user["id"].as_str().unwrap()).unwrap()
    }

    async fn create_package(&self, location: &Value, user_id: Uuid, receipt: &str) -> (StatusCode, Value) {
        self.as_admin(
            "POST",
            "/packages",
            Some(json!({
                "receipt_number": receipt,
                "courier_name": "JNE",
                "user_id": user_id,
                "location_id": location["id"],
                "size": "M"
            })),
        )
        .await
    }
}

fn flat_location() -> Value {
    json!({
        "name": "Tower A",
        "pricing_scheme": "FLAT",
        "price_config": { "basePrice": 5000, "penaltyPer24h": 3000 },
        "grace_period_days": 1
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let h = setup();
    let (status, body) = h.send(request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["locations"], 0);
    assert_eq!(body["packages"], 0);
    assert_eq!(body["awaiting_pickup"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let h = setup();
    let response = h
        .app
        .clone()
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("packages_created_total"));
    assert!(body.contains("penalty_updates_total"));
}

#[tokio::test]
async fn requests_without_identity_are_rejected() {
    let h = setup();
    let (status, body) = h
        .send(request("POST", "/locations", None, Some(flat_location())))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn residents_cannot_manage_locations() {
    let h = setup();
    let (status, _) = h
        .send(request(
            "POST",
            "/locations",
            Some((Uuid::new_v4(), "resident")),
            Some(flat_location()),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_location_defaults_to_flat_pricing() {
    let h = setup();
    let location = h.create_location(json!({ "name": "Green Park Residence" })).await;

    assert_eq!(location["slug"], "green-park-residence");
    assert_eq!(location["pricing_scheme"], "FLAT");
    assert_eq!(location["price_config"]["basePrice"], "5000");
    assert_eq!(location["price_config"]["penaltyPer24h"], "3000");
    assert_eq!(location["grace_period_days"], 0);
    assert_eq!(location["delivery"]["enabled"], false);

    let (status, by_slug) = h
        .send(request("GET", "/location-slugs/green-park-residence", None, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_slug["id"], location["id"]);
}

#[tokio::test]
async fn unknown_pricing_scheme_is_a_configuration_error() {
    let h = setup();
    let (status, body) = h
        .as_admin(
            "POST",
            "/locations",
            Some(json!({ "name": "Tower B", "pricing_scheme": "HOURLY" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "configuration");
    assert!(body["error"].as_str().unwrap().contains("tower-b"));
}

#[tokio::test]
async fn duplicate_location_name_is_rejected() {
    let h = setup();
    h.create_location(flat_location()).await;
    let (status, _) = h
        .as_admin("POST", "/locations", Some(json!({ "name": "tower a" })))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn rename_onto_an_existing_slug_is_a_conflict() {
    let h = setup();
    h.create_location(flat_location()).await;
    let other = h.create_location(json!({ "name": "Tower B" })).await;
    let uri = format!("/locations/{}", other["id"].as_str().unwrap());

    let (status, body) = h
        .as_admin("PATCH", &uri, Some(json!({ "name": "TOWER A" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (_, unchanged) = h.as_admin("GET", &uri, None).await;
    assert_eq!(unchanged["slug"], "tower-b");
}

#[tokio::test]
async fn renamed_location_releases_its_old_slug() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let uri = format!("/locations/{}", location["id"].as_str().unwrap());

    let (status, renamed) = h
        .as_admin("PATCH", &uri, Some(json!({ "name": "North Wing" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["slug"], "north-wing");

    let (status, by_slug) = h
        .send(request("GET", "/location-slugs/north-wing", None, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_slug["id"], location["id"]);

    let (status, _) = h
        .send(request("GET", "/location-slugs/tower-a", None, None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let reused = h.create_location(flat_location()).await;
    assert_eq!(reused["slug"], "tower-a");
    assert_ne!(reused["id"], location["id"]);
}

#[tokio::test]
async fn switching_scheme_without_config_resets_to_defaults() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let uri = format!("/locations/{}", location["id"].as_str().unwrap());

    let (status, updated) = h
        .as_admin("PATCH", &uri, Some(json!({ "pricing_scheme": "FLAT_SIZE" })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["pricing_scheme"], "FLAT_SIZE");
    assert_eq!(updated["price_config"]["S"]["base"], "3000");
    assert_eq!(updated["price_config"]["XL"]["penalty"], "5000");
    assert_eq!(updated["grace_period_days"], 1);
}

#[tokio::test]
async fn retired_location_accepts_no_packages() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;

    let uri = format!("/locations/{}", location["id"].as_str().unwrap());
    let (status, retired) = h.as_admin("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retired["state"], "RETIRED");

    let (status, _) = h.create_package(&location, resident, "JNE-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_package_snapshots_base_price() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;

    let (status, package) = h.create_package(&location, resident, "JNE-001").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(package["status"], "PENDING_PICKUP");
    assert_eq!(package["payment_status"], "UNPAID");
    assert_eq!(package["base_price"], "5000");
    assert_eq!(package["penalty_fee"], "0");
    assert_eq!(package["daily_ordinal"], 1);

    let (status, by_receipt) = h.as_admin("GET", "/receipts/JNE-001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_receipt["id"], package["id"]);
}

#[tokio::test]
async fn progressive_package_prices_later_arrivals_lower() {
    let h = setup();
    let location = h
        .create_location(json!({
            "name": "Tower C",
            "pricing_scheme": "PROGRESSIVE_PACKAGE"
        }))
        .await;
    assert_eq!(location["price_config"]["firstPackagePrice"], "5000");
    let resident = h.create_resident("Budi", "0811").await;

    let (status, first) = h.create_package(&location, resident, "JNE-101").await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["daily_ordinal"], 1);
    assert_eq!(first["base_price"], "5000");

    let (status, second) = h.create_package(&location, resident, "JNE-102").await;
    assert_eq!(status, StatusCode::OK, "{second}");
    assert_eq!(second["daily_ordinal"], 2);
    assert_eq!(second["base_price"], "3000");
}

#[tokio::test]
async fn duplicate_receipt_is_rejected_and_first_kept() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let other = h.create_resident("Sari", "0812").await;

    let (_, first) = h.create_package(&location, resident, "JNE-777").await;
    let (status, body) = h.create_package(&location, other, "JNE-777").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (_, stored) = h.as_admin("GET", "/receipts/JNE-777", None).await;
    assert_eq!(stored["id"], first["id"]);
    assert_eq!(stored["user_id"], json!(resident));
    assert_eq!(h.state.packages.len(), 1);
}

#[tokio::test]
async fn apartment_mismatch_is_rejected() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let (_, user) = h
        .as_admin(
            "POST",
            "/users",
            Some(json!({ "name": "Rina", "phone": "0819", "apartment_name": "Tower Z" })),
        )
        .await;
    let resident = Uuid::parse_str(user["id"].as_str().unwrap()).unwrap();

    let (status, _) = h.create_package(&location, resident, "JNE-9").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn handover_requires_payment() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-002").await;
    let id = package["id"].as_str().unwrap();

    let (status, body) = h
        .as_admin("POST", &format!("/packages/{id}/handover"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "package has not been paid");

    let (_, stored) = h.as_admin("GET", &format!("/packages/{id}"), None).await;
    assert_eq!(stored["status"], "PENDING_PICKUP");
}

#[tokio::test]
async fn pay_then_handover_is_idempotent() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-003").await;
    let id = package["id"].as_str().unwrap();
    let owner = Some((resident, "resident"));

    let (status, receipt) = h
        .send(request("POST", &format!("/packages/{id}/pay"), owner, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["amount"], "5000");
    assert_eq!(receipt["is_exempt"], false);
    assert_eq!(receipt["already_paid"], false);
    assert_eq!(receipt["package"]["status"], "PAID");
    assert_eq!(receipt["transaction"]["status"], "PAID");

    let (status, again) = h
        .send(request("POST", &format!("/packages/{id}/pay"), owner, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["already_paid"], true);
    assert_eq!(again["amount"], "0");
    assert_eq!(h.state.transactions.len(), 1);

    let (status, first) = h
        .as_admin("POST", &format!("/packages/{id}/handover"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["changed"], true);
    assert_eq!(first["package"]["status"], "COMPLETED");

    let (status, second) = h
        .as_admin("POST", &format!("/packages/{id}/handover"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["changed"], false);
    assert_eq!(second["package"]["status"], "COMPLETED");
}

#[tokio::test]
async fn residents_cannot_pay_for_other_residents() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-004").await;
    let id = package["id"].as_str().unwrap();

    let (status, _) = h
        .send(request(
            "POST",
            &format!("/packages/{id}/pay"),
            Some((Uuid::new_v4(), "resident")),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn active_member_pays_nothing() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let tomorrow = Utc::now() + Duration::days(1);

    let (status, _) = h
        .as_admin(
            "PATCH",
            &format!("/users/{resident}/membership"),
            Some(json!({ "is_member": true, "member_expiry_date": tomorrow })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, package) = h.create_package(&location, resident, "JNE-005").await;
    let id = package["id"].as_str().unwrap();

    let (_, check) = h
        .as_admin("GET", &format!("/packages/{id}/payable"), None)
        .await;
    assert_eq!(check["payable"]["amount"], "0");
    assert_eq!(check["payable"]["is_exempt"], true);
    assert_eq!(check["ready_for_handover"], false);

    let (status, receipt) = h
        .send(request(
            "POST",
            &format!("/packages/{id}/pay"),
            Some((resident, "resident")),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["amount"], "0");
    assert_eq!(receipt["is_exempt"], true);
    assert_eq!(receipt["transaction"]["is_exempt"], true);
}

#[tokio::test]
async fn penalty_accrues_on_read_after_grace() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-006").await;
    let id = Uuid::parse_str(package["id"].as_str().unwrap()).unwrap();

    if let Some(mut stored) = h.state.packages.get_mut(&id) {
        stored.created_at = Utc::now() - Duration::hours(49);
    }

    let (status, refreshed) = h.as_admin("GET", &format!("/packages/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["penalty_fee"], "3000");

    let (_, check) = h
        .as_admin("GET", &format!("/packages/{id}/payable"), None)
        .await;
    assert_eq!(check["payable"]["amount"], "8000");
}

#[tokio::test]
async fn destroy_after_payment_is_rejected() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-007").await;
    let id = package["id"].as_str().unwrap();

    h.as_admin("POST", &format!("/packages/{id}/mark-paid"), None)
        .await;
    let (status, body) = h.as_admin("DELETE", &format!("/packages/{id}"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "package already paid");
    assert_eq!(h.state.packages.len(), 1);
}

#[tokio::test]
async fn destroy_frees_the_receipt_number() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-008").await;
    let id = package["id"].as_str().unwrap();

    let (status, body) = h.as_admin("DELETE", &format!("/packages/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destroyed"], true);

    let (status, _) = h.create_package(&location, resident, "JNE-008").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-009").await;
    let id = package["id"].as_str().unwrap();

    let (status, _) = h
        .as_admin(
            "POST",
            &format!("/packages/{id}/mark-paid"),
            Some(json!({ "expected_version": 42 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, done) = h
        .as_admin(
            "POST",
            &format!("/packages/{id}/mark-paid"),
            Some(json!({ "expected_version": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["package"]["payment_status"], "PAID");
}

#[tokio::test]
async fn gateway_checkout_settles_on_signed_callback() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-010").await;
    let id = package["id"].as_str().unwrap();
    let owner = Some((resident, "resident"));

    let (status, transaction) = h
        .send(request("POST", &format!("/packages/{id}/checkout"), owner, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transaction["status"], "PENDING");
    assert_eq!(transaction["amount"], "5000");

    let (_, reused) = h
        .send(request("POST", &format!("/packages/{id}/checkout"), owner, None))
        .await;
    assert_eq!(reused["id"], transaction["id"]);

    let order_id = transaction["id"].as_str().unwrap().to_string();
    let callback = json!({
        "order_id": order_id,
        "transaction_status": "settlement",
        "status_code": "200",
        "gross_amount": "5000.00",
        "signature_key": signature(&order_id, "200", "5000.00", SERVER_KEY),
    });

    let (status, body) = h
        .send(request("POST", "/webhooks/payment", None, Some(callback.clone())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "settled");

    let (_, stored) = h.as_admin("GET", &format!("/packages/{id}"), None).await;
    assert_eq!(stored["status"], "PAID");
    assert_eq!(stored["payment_status"], "PAID");

    let (status, redelivered) = h
        .send(request("POST", "/webhooks/payment", None, Some(callback)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(redelivered["outcome"], "ignored");
}

#[tokio::test]
async fn forged_callback_is_rejected() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-011").await;
    let id = package["id"].as_str().unwrap();

    let (_, transaction) = h
        .send(request(
            "POST",
            &format!("/packages/{id}/checkout"),
            Some((resident, "resident")),
            None,
        ))
        .await;
    let order_id = transaction["id"].as_str().unwrap().to_string();

    let (status, body) = h
        .send(request(
            "POST",
            "/webhooks/payment",
            None,
            Some(json!({
                "order_id": order_id,
                "transaction_status": "settlement",
                "status_code": "200",
                "gross_amount": "5000.00",
                "signature_key": signature(&order_id, "200", "5000.00", "wrong-key"),
            })),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (_, stored) = h.as_admin("GET", &format!("/packages/{id}"), None).await;
    assert_eq!(stored["payment_status"], "UNPAID");
}

#[tokio::test]
async fn membership_purchase_extends_expiry() {
    let h = setup();
    let resident = h.create_resident("Budi", "0811").await;

    let (status, plan) = h
        .as_admin(
            "POST",
            "/membership-plans",
            Some(json!({ "name": "Monthly", "price": 50000, "duration_days": 30 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, transaction) = h
        .send(request(
            "POST",
            "/memberships/checkout",
            Some((resident, "resident")),
            Some(json!({ "plan_id": plan["id"] })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transaction["kind"], "MEMBERSHIP_BUY");
    assert_eq!(transaction["amount"], "50000");

    let order_id = transaction["id"].as_str().unwrap().to_string();
    let (status, body) = h
        .send(request(
            "POST",
            "/webhooks/payment",
            None,
            Some(json!({
                "order_id": order_id,
                "transaction_status": "capture",
                "fraud_status": "accept",
                "status_code": "200",
                "gross_amount": "50000.00",
                "signature_key": signature(&order_id, "200", "50000.00", SERVER_KEY),
            })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "settled");

    let user = h.state.user(resident).unwrap();
    assert!(user.is_member);
    let expiry = user.member_expiry_date.unwrap();
    assert!(expiry > Utc::now() + Duration::days(29));
    assert!(expiry <= Utc::now() + Duration::days(30));
}

#[tokio::test]
async fn dashboard_lists_pending_and_completed() {
    let h = setup();
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, waiting) = h.create_package(&location, resident, "JNE-020").await;
    let (_, done) = h.create_package(&location, resident, "JNE-021").await;
    let done_id = done["id"].as_str().unwrap();

    h.as_admin("POST", &format!("/packages/{done_id}/mark-paid"), None)
        .await;
    h.as_admin("POST", &format!("/packages/{done_id}/handover"), None)
        .await;

    let (status, dashboard) = h
        .send(request(
            "GET",
            &format!("/users/{resident}/packages"),
            Some((resident, "resident")),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["pending"].as_array().unwrap().len(), 1);
    assert_eq!(dashboard["pending"][0]["id"], waiting["id"]);
    assert_eq!(dashboard["completed"][0]["id"], done["id"]);

    let (status, _) = h
        .send(request(
            "GET",
            &format!("/users/{resident}/packages"),
            Some((Uuid::new_v4(), "resident")),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delivery_fee_is_added_when_enabled() {
    let h = setup();
    let location = h
        .create_location(json!({
            "name": "Tower C",
            "delivery": { "enabled": true, "S": 5000, "M": 7000, "L": 10000, "XL": 15000 }
        }))
        .await;
    let resident = h.create_resident("Budi", "0811").await;
    let (_, package) = h.create_package(&location, resident, "JNE-030").await;
    let id = package["id"].as_str().unwrap();

    let (status, updated) = h
        .send(request(
            "POST",
            &format!("/packages/{id}/delivery"),
            Some((resident, "resident")),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["delivery_fee"], "7000");

    let (_, check) = h
        .as_admin("GET", &format!("/packages/{id}/payable"), None)
        .await;
    assert_eq!(check["payable"]["amount"], "12000");
}

struct Unreachable;

impl Notifier for Unreachable {
    fn channel(&self) -> &'static str {
        "whatsapp"
    }

    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError {
            channel: "whatsapp",
            reason: "connection refused".to_string(),
        })
    }
}

#[tokio::test]
async fn failed_notification_does_not_undo_intake() {
    let h = setup_with(Dispatcher::new(vec![Arc::new(Unreachable)]));
    let location = h.create_location(flat_location()).await;
    let resident = h.create_resident("Budi", "0811").await;

    let (status, package) = h.create_package(&location, resident, "JNE-040").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(package["receipt_number"], "JNE-040");
    assert_eq!(h.state.packages.len(), 1);

    let response = h
        .app
        .clone()
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();
    let body = body_string(response).await;
    assert!(body.contains("notification_failures_total{channel=\"whatsapp\"} 1"));
}
