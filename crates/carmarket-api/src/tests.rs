//! Router-level tests: the full middleware stack over an in-memory database.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use carmarket_db::Database;
use carmarket_gateway::Dispatcher;
use carmarket_types::events::GatewayEvent;
use carmarket_types::models::Role;

use crate::session::{SESSION_COOKIE, SessionConfig};
use crate::{AppState, AppStateInner, router};

const PASSWORD: &str = "Sup3r!secret";

struct TestApp {
    state: AppState,
    app: Router,
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    retry_after: Option<String>,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionConfig::new(b"test-secret", false).unwrap();
        let state = AppStateInner::new(db, Dispatcher::new(), sessions, false);
        let app = router(state.clone());
        Self { state, app }
    }

    async fn call(&self, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        Reply {
            status,
            cookie,
            retry_after,
            body,
        }
    }

    /// Registers a user and returns `(cookie, user id)`.
    async fn register(&self, username: &str) -> (String, Uuid) {
        let reply = self
            .call(
                Method::POST,
                "/api/register",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        let id = reply.body["id"].as_str().unwrap().parse().unwrap();
        (reply.cookie.unwrap(), id)
    }

    async fn register_with_role(&self, username: &str, role: Role) -> (String, Uuid) {
        let (cookie, id) = self.register(username).await;
        self.state.db.set_user_role(id, role).unwrap();
        (cookie, id)
    }
}

fn car_json(name: &str) -> Value {
    json!({
        "name": name,
        "price": 8_500_000,
        "category": "sport",
        "server": "patriki",
        "maxSpeed": 305,
        "acceleration": "3.3s",
        "description": "Twin-turbo V8",
        "isPremium": false
    })
}

#[tokio::test]
async fn session_lifecycle() {
    let t = TestApp::new();
    let (cookie, id) = t.register("Alice").await;
    assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));

    let me = t.call(Method::GET, "/api/user", Some(&cookie), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["id"], id.to_string());
    assert_eq!(me.body["role"], "user");
    assert!(me.body.get("password").is_none());

    let out = t.call(Method::POST, "/api/logout", Some(&cookie), None).await;
    assert_eq!(out.status, StatusCode::NO_CONTENT);

    let me = t.call(Method::GET, "/api/user", Some(&cookie), None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);

    let again = t.call(Method::POST, "/api/logout", None, None).await;
    assert_eq!(again.status, StatusCode::NO_CONTENT);

    let login = t
        .call(
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "username": "alice", "password": PASSWORD })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["username"], "Alice");
    assert!(login.cookie.is_some());
}

#[tokio::test]
async fn register_rejects_bad_input_and_duplicates() {
    let t = TestApp::new();

    let bad = t
        .call(
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "username": "1x", "password": "short" })),
        )
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = bad.body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["password", "username"]);

    let malformed = t
        .call(Method::POST, "/api/register", None, Some(json!({ "username": "bob" })))
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    t.register("bob").await;
    let dup = t
        .call(
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "username": "BOB", "password": PASSWORD })),
        )
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn usernames_fold_case_beyond_ascii() {
    let t = TestApp::new();
    t.register("Иван").await;

    let dup = t
        .call(
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "username": "иван", "password": PASSWORD })),
        )
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);

    let login = t
        .call(
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "username": "ИВАН", "password": PASSWORD })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["username"], "Иван");
}

#[tokio::test]
async fn malformed_ids_get_a_json_error() {
    let t = TestApp::new();
    let (cookie, _) = t.register("carol").await;

    let car = t.call(Method::GET, "/api/cars/not-a-uuid", None, None).await;
    assert_eq!(car.status, StatusCode::BAD_REQUEST);
    assert!(car.body["message"].as_str().is_some_and(|m| !m.is_empty()));

    let thread = t
        .call(Method::GET, "/api/messages/car/123/456", Some(&cookie), None)
        .await;
    assert_eq!(thread.status, StatusCode::BAD_REQUEST);
    assert!(thread.body["message"].is_string());
}

#[tokio::test]
async fn repeated_failures_block_the_address() {
    let t = TestApp::new();
    t.register("victim").await;

    for expected_left in (0..5).rev() {
        let reply = t
            .call(
                Method::POST,
                "/api/login",
                None,
                Some(json!({ "username": "victim", "password": "Wrong!pass1" })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["attemptsLeft"], expected_left);
    }

    let blocked = t
        .call(
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "username": "victim", "password": PASSWORD })),
        )
        .await;
    assert_eq!(blocked.status, StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = blocked.retry_after.unwrap().parse().unwrap();
    assert!(retry > 14 * 60 && retry <= 15 * 60);

    let register = t
        .call(
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "username": "newcomer", "password": PASSWORD })),
        )
        .await;
    assert_eq!(register.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn approved_application_becomes_a_listing() {
    let t = TestApp::new();
    let (seller, seller_id) = t.register("seller").await;
    let (moderator, moderator_id) = t.register_with_role("moderator", Role::Moderator).await;

    let (_conn, mut events) = t.state.dispatcher.connect(seller_id).await;

    let submitted = t
        .call(Method::POST, "/api/car-applications", Some(&seller), Some(car_json("BMW M5")))
        .await;
    assert_eq!(submitted.status, StatusCode::CREATED);
    assert_eq!(submitted.body["status"], "pending");
    let app_id = submitted.body["id"].as_str().unwrap().to_string();

    let forbidden = t
        .call(
            Method::PATCH,
            &format!("/api/applications/{app_id}"),
            Some(&seller),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let pending = t.call(Method::GET, "/api/applications/pending", Some(&moderator), None).await;
    assert_eq!(pending.body.as_array().unwrap().len(), 1);

    let back_to_pending = t
        .call(
            Method::PATCH,
            &format!("/api/applications/{app_id}"),
            Some(&moderator),
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_eq!(back_to_pending.status, StatusCode::BAD_REQUEST);

    let approved = t
        .call(
            Method::PATCH,
            &format!("/api/applications/{app_id}"),
            Some(&moderator),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(approved.status, StatusCode::OK);
    assert_eq!(approved.body["status"], "approved");
    assert_eq!(approved.body["reviewedBy"], moderator_id.to_string());
    let car_id = approved.body["carId"].as_str().unwrap().to_string();

    assert!(matches!(
        events.try_recv(),
        Ok(GatewayEvent::ApplicationReviewed { .. })
    ));

    let again = t
        .call(
            Method::PATCH,
            &format!("/api/applications/{app_id}"),
            Some(&moderator),
            Some(json!({ "status": "rejected" })),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let catalog = t.call(Method::GET, "/api/cars", None, None).await;
    let cars = catalog.body.as_array().unwrap();
    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0]["id"], car_id);
    assert_eq!(cars[0]["name"], "BMW M5");
    assert_eq!(cars[0]["createdBy"], seller_id.to_string());

    let searched = t.call(Method::GET, "/api/cars?search=bmw&server=patriki", None, None).await;
    assert_eq!(searched.body.as_array().unwrap().len(), 1);
    let missed = t.call(Method::GET, "/api/cars?category=suv", None, None).await;
    assert!(missed.body.as_array().unwrap().is_empty());

    let mine = t.call(Method::GET, "/api/applications", Some(&seller), None).await;
    assert_eq!(mine.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn car_permissions() {
    let t = TestApp::new();
    let (owner, owner_id) = t.register("owner").await;
    let (stranger, _) = t.register("stranger").await;
    let (moderator, _) = t.register_with_role("moderator", Role::Moderator).await;

    let denied = t.call(Method::POST, "/api/cars", Some(&owner), Some(car_json("Audi RS6"))).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let anonymous = t.call(Method::GET, "/api/my-cars", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let car = t
        .state
        .db
        .create_car(
            owner_id,
            &serde_json::from_value(car_json("Audi RS6")).unwrap(),
            carmarket_types::models::CarStatus::Active,
        )
        .unwrap();
    let path = format!("/api/cars/{}", car.id);

    let mut edited = car_json("Audi RS6 Avant");
    edited["price"] = json!(9_000_000);
    let by_stranger = t.call(Method::PUT, &path, Some(&stranger), Some(edited.clone())).await;
    assert_eq!(by_stranger.status, StatusCode::FORBIDDEN);
    let by_owner = t.call(Method::PUT, &path, Some(&owner), Some(edited)).await;
    assert_eq!(by_owner.status, StatusCode::OK);
    assert_eq!(by_owner.body["price"], 9_000_000);

    let hidden = t
        .call(
            Method::PATCH,
            &format!("{path}/status"),
            Some(&moderator),
            Some(json!({ "status": "rejected" })),
        )
        .await;
    assert_eq!(hidden.status, StatusCode::OK);
    assert_eq!(t.call(Method::GET, &path, None, None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(t.call(Method::GET, &path, Some(&stranger), None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(t.call(Method::GET, &path, Some(&owner), None).await.status, StatusCode::OK);

    let mine = t.call(Method::GET, "/api/my-cars", Some(&owner), None).await;
    assert_eq!(mine.body.as_array().unwrap().len(), 1);

    assert_eq!(
        t.call(Method::DELETE, &path, Some(&stranger), None).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        t.call(Method::DELETE, &path, Some(&moderator), None).await.status,
        StatusCode::NO_CONTENT
    );
    assert_eq!(t.call(Method::GET, &path, Some(&owner), None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn favorites_toggle() {
    let t = TestApp::new();
    let (fan, fan_id) = t.register("fan").await;
    let car = t
        .state
        .db
        .create_car(
            fan_id,
            &serde_json::from_value(car_json("Mercedes G63")).unwrap(),
            carmarket_types::models::CarStatus::Active,
        )
        .unwrap();

    let on = t
        .call(Method::POST, "/api/favorites", Some(&fan), Some(json!({ "carId": car.id })))
        .await;
    assert_eq!(on.body, json!({ "carId": car.id, "favorited": true }));

    let status = t
        .call(Method::GET, &format!("/api/favorites/{}", car.id), Some(&fan), None)
        .await;
    assert_eq!(status.body["favorited"], true);
    let list = t.call(Method::GET, "/api/favorites", Some(&fan), None).await;
    assert_eq!(list.body.as_array().unwrap().len(), 1);

    let off = t
        .call(Method::POST, "/api/favorites", Some(&fan), Some(json!({ "carId": car.id })))
        .await;
    assert_eq!(off.body["favorited"], false);

    let removed = t
        .call(Method::DELETE, &format!("/api/favorites/{}", car.id), Some(&fan), None)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let unknown = t
        .call(Method::POST, "/api/favorites", Some(&fan), Some(json!({ "carId": Uuid::new_v4() })))
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn messaging_between_buyer_and_seller() {
    let t = TestApp::new();
    let (seller, seller_id) = t.register("seller").await;
    let (buyer, buyer_id) = t.register("buyer").await;
    let (_, bystander_id) = t.register("bystander").await;
    let car = t
        .state
        .db
        .create_car(
            seller_id,
            &serde_json::from_value(car_json("Porsche 911")).unwrap(),
            carmarket_types::models::CarStatus::Active,
        )
        .unwrap();

    let (_c1, mut seller_tab) = t.state.dispatcher.connect(seller_id).await;
    let (_c2, mut buyer_tab) = t.state.dispatcher.connect(buyer_id).await;

    let to_self = t
        .call(
            Method::POST,
            "/api/messages",
            Some(&buyer),
            Some(json!({ "carId": car.id, "recipientId": buyer_id, "content": "hi" })),
        )
        .await;
    assert_eq!(to_self.status, StatusCode::BAD_REQUEST);

    let not_owner = t
        .call(
            Method::POST,
            "/api/messages",
            Some(&buyer),
            Some(json!({ "carId": car.id, "recipientId": bystander_id, "content": "hi" })),
        )
        .await;
    assert_eq!(not_owner.status, StatusCode::BAD_REQUEST);

    let empty = t
        .call(
            Method::POST,
            "/api/messages",
            Some(&buyer),
            Some(json!({ "carId": car.id, "recipientId": seller_id, "content": "" })),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let sent = t
        .call(
            Method::POST,
            "/api/messages",
            Some(&buyer),
            Some(json!({ "carId": car.id, "recipientId": seller_id, "content": "Still for sale?" })),
        )
        .await;
    assert_eq!(sent.status, StatusCode::CREATED);
    assert_eq!(sent.body["isRead"], false);
    assert_eq!(sent.body["carName"], "Porsche 911");
    let message_id = sent.body["id"].as_str().unwrap().to_string();

    match seller_tab.try_recv() {
        Ok(GatewayEvent::NewMessage { car_name, sender_name, .. }) => {
            assert_eq!(car_name, "Porsche 911");
            assert_eq!(sender_name, "buyer");
        }
        other => panic!("expected new_message, got {other:?}"),
    }

    for cookie in [&seller, &buyer] {
        let list = t.call(Method::GET, "/api/messages", Some(cookie), None).await;
        assert_eq!(list.body.as_array().unwrap().len(), 1);
    }
    let unread = t.call(Method::GET, "/api/messages/unread-count", Some(&seller), None).await;
    assert_eq!(unread.body, json!({ "count": 1 }));
    let unread = t.call(Method::GET, "/api/messages/unread-count", Some(&buyer), None).await;
    assert_eq!(unread.body, json!({ "count": 0 }));

    let thread = t
        .call(
            Method::GET,
            &format!("/api/messages/car/{}/{}", car.id, buyer_id),
            Some(&seller),
            None,
        )
        .await;
    assert_eq!(thread.body.as_array().unwrap().len(), 1);

    let wrong_reader = t
        .call(Method::PATCH, &format!("/api/messages/{message_id}/read"), Some(&buyer), None)
        .await;
    assert_eq!(wrong_reader.status, StatusCode::FORBIDDEN);

    let read = t
        .call(
            Method::POST,
            "/api/messages/read",
            Some(&seller),
            Some(json!({ "carId": car.id, "otherUserId": buyer_id })),
        )
        .await;
    assert_eq!(read.body, json!({ "updated": 1 }));
    assert!(matches!(
        buyer_tab.try_recv(),
        Ok(GatewayEvent::MessagesRead { reader_id, .. }) if reader_id == seller_id
    ));

    let unread = t.call(Method::GET, "/api/messages/unread-count", Some(&seller), None).await;
    assert_eq!(unread.body["count"], 0);

    let not_staff = t
        .call(Method::DELETE, &format!("/api/messages/{message_id}"), Some(&seller), None)
        .await;
    assert_eq!(not_staff.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_user_management() {
    let t = TestApp::new();
    let (admin, admin_id) = t.register_with_role("admin", Role::Admin).await;
    let (moderator, _) = t.register_with_role("moderator", Role::Moderator).await;
    let (member, member_id) = t.register("member").await;

    let car = t
        .state
        .db
        .create_car(
            member_id,
            &serde_json::from_value(car_json("Lada")).unwrap(),
            carmarket_types::models::CarStatus::Active,
        )
        .unwrap();

    assert_eq!(
        t.call(Method::GET, "/api/users", Some(&moderator), None).await.status,
        StatusCode::FORBIDDEN
    );
    let users = t.call(Method::GET, "/api/users", Some(&admin), None).await;
    assert_eq!(users.body.as_array().unwrap().len(), 3);

    let self_demote = t
        .call(
            Method::PATCH,
            &format!("/api/users/{admin_id}/role"),
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(self_demote.status, StatusCode::BAD_REQUEST);

    let promoted = t
        .call(
            Method::PATCH,
            &format!("/api/users/{member_id}/role"),
            Some(&admin),
            Some(json!({ "role": "moderator" })),
        )
        .await;
    assert_eq!(promoted.body["role"], "moderator");

    let taken = t
        .call(
            Method::PATCH,
            &format!("/api/users/{member_id}"),
            Some(&admin),
            Some(json!({ "username": "Moderator" })),
        )
        .await;
    assert_eq!(taken.status, StatusCode::CONFLICT);

    let reset = t
        .call(
            Method::PATCH,
            &format!("/api/users/{member_id}"),
            Some(&admin),
            Some(json!({ "password": "N3w!password" })),
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK);
    // Password reset ends existing sessions
    assert_eq!(
        t.call(Method::GET, "/api/user", Some(&member), None).await.status,
        StatusCode::UNAUTHORIZED
    );

    assert_eq!(
        t.call(Method::DELETE, &format!("/api/users/{admin_id}"), Some(&admin), None)
            .await
            .status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        t.call(Method::DELETE, &format!("/api/users/{member_id}"), Some(&admin), None)
            .await
            .status,
        StatusCode::NO_CONTENT
    );
    assert!(t.state.db.get_car(car.id).unwrap().is_none());
    assert!(t.state.db.get_user_by_id(member_id).unwrap().is_none());
}
