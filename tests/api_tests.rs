//! API integration tests
//!
//! These tests require a running server with a Postgres database.
//! Run with: cargo test --test api_tests

use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080";
const WS_URL: &str = "ws://localhost:8080/ws/events";

/// Check if API is available
async fn api_available() -> bool {
    let client = Client::new();
    client
        .get(format!("{}/health", BASE_URL))
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

/// Create a user with a unique username, returning the JSON body
async fn create_test_user(client: &Client) -> Value {
    let suffix = Uuid::new_v4().simple().to_string();
    let resp = client
        .post(format!("{}/api/users", BASE_URL))
        .json(&json!({
            "username": format!("tester-{}", &suffix[..12]),
            "email": format!("tester-{}@example.com", &suffix[..12]),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "create user failed");
    resp.json().await.unwrap()
}

/// Create an item owned by the given user
async fn create_test_item(client: &Client, owner_id: &str, name: &str) -> Value {
    let resp = client
        .post(format!("{}/api/items", BASE_URL))
        .json(&json!({
            "owner_id": owner_id,
            "name": name,
            "description": "integration test item",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "create item failed");
    resp.json().await.unwrap()
}

/// Helper to delete a user (cascades to their items)
async fn delete_user(client: &Client, user_id: &str) {
    let _ = client
        .delete(format!("{}/api/users/{}", BASE_URL, user_id))
        .send()
        .await;
}

#[tokio::test]
async fn test_health_endpoint() {
    if !api_available().await {
        eprintln!("Skipping test: API not available at {}", BASE_URL);
        return;
    }

    let client = Client::new();
    let resp = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["services"]["database"], "connected");
}

#[tokio::test]
async fn test_user_crud_lifecycle() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let user = create_test_user(&client).await;
    let user_id = user["id"].as_str().unwrap();

    // Get it back
    let resp = client
        .get(format!("{}/api/users/{}", BASE_URL, user_id))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let fetched: Value = resp.json().await.unwrap();
    assert_eq!(fetched["username"], user["username"]);

    // Partial update
    let resp = client
        .patch(format!("{}/api/users/{}", BASE_URL, user_id))
        .json(&json!({"bio": "I trade lamps"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["bio"], "I trade lamps");
    assert_eq!(updated["username"], user["username"]);

    // Duplicate username conflicts
    let resp = client
        .post(format!("{}/api/users", BASE_URL))
        .json(&json!({
            "username": user["username"],
            "email": "other@example.com",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Delete, then 404
    let resp = client
        .delete(format!("{}/api/users/{}", BASE_URL, user_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/users/{}", BASE_URL, user_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_item_crud_and_filters() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let user = create_test_user(&client).await;
    let user_id = user["id"].as_str().unwrap();

    let item = create_test_item(&client, user_id, "Vintage Lamp").await;
    let item_id = item["id"].as_str().unwrap();
    assert_eq!(item["status"], "available");
    assert_eq!(item["category"], "general");

    // Filter by owner
    let resp = client
        .get(format!("{}/api/items?owner_id={}", BASE_URL, user_id))
        .send()
        .await
        .unwrap();
    let items: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], item["id"]);

    // Patch status
    let resp = client
        .patch(format!("{}/api/items/{}", BASE_URL, item_id))
        .json(&json!({"status": "pending"}))
        .send()
        .await
        .unwrap();
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["status"], "pending");
    assert_eq!(updated["name"], "Vintage Lamp");

    // Empty name rejected
    let resp = client
        .post(format!("{}/api/items", BASE_URL))
        .json(&json!({"owner_id": user_id, "name": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown owner rejected (foreign key)
    let resp = client
        .post(format!("{}/api/items", BASE_URL))
        .json(&json!({"owner_id": Uuid::new_v4(), "name": "Orphan"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    delete_user(&client, user_id).await;
}

#[tokio::test]
async fn test_offer_accept_forms_trade() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let alice = create_test_user(&client).await;
    let bob = create_test_user(&client).await;
    let alice_id = alice["id"].as_str().unwrap();
    let bob_id = bob["id"].as_str().unwrap();

    let lamp = create_test_item(&client, alice_id, "Lamp").await;
    let chair = create_test_item(&client, bob_id, "Chair").await;

    // Alice offers her lamp for Bob's chair
    let resp = client
        .post(format!("{}/api/offers", BASE_URL))
        .json(&json!({
            "item_offered_id": lamp["id"],
            "item_requested_id": chair["id"],
            "from_user_id": alice_id,
            "to_user_id": bob_id,
            "message": "swap?",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let offer: Value = resp.json().await.unwrap();
    let offer_id = offer["id"].as_str().unwrap();
    assert_eq!(offer["status"], "pending");

    // Accept forms a trade
    let resp = client
        .post(format!("{}/api/offers/{}/accept", BASE_URL, offer_id))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let trade: Value = resp.json().await.unwrap();
    assert_eq!(trade["offer_id"], offer["id"]);

    // Both items are now traded
    for item in [&lamp, &chair] {
        let resp = client
            .get(format!(
                "{}/api/items/{}",
                BASE_URL,
                item["id"].as_str().unwrap()
            ))
            .send()
            .await
            .unwrap();
        let fetched: Value = resp.json().await.unwrap();
        assert_eq!(fetched["status"], "traded");
    }

    // Accepting again is rejected: offer is no longer pending
    let resp = client
        .post(format!("{}/api/offers/{}/accept", BASE_URL, offer_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Rating by a trade party succeeds; a second rating by the same party conflicts
    let trade_id = trade["id"].as_str().unwrap();
    let resp = client
        .post(format!("{}/api/ratings", BASE_URL))
        .json(&json!({
            "trade_id": trade_id,
            "rater_id": alice_id,
            "ratee_id": bob_id,
            "score": 5,
            "comment": "smooth trade",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{}/api/ratings", BASE_URL))
        .json(&json!({
            "trade_id": trade_id,
            "rater_id": alice_id,
            "ratee_id": bob_id,
            "score": 1,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // A non-party rater is rejected
    let mallory = create_test_user(&client).await;
    let resp = client
        .post(format!("{}/api/ratings", BASE_URL))
        .json(&json!({
            "trade_id": trade_id,
            "rater_id": mallory["id"],
            "ratee_id": bob_id,
            "score": 3,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    delete_user(&client, mallory["id"].as_str().unwrap()).await;
    delete_user(&client, alice_id).await;
    delete_user(&client, bob_id).await;
}

#[tokio::test]
async fn test_reject_and_withdraw_require_pending() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let alice = create_test_user(&client).await;
    let bob = create_test_user(&client).await;
    let alice_id = alice["id"].as_str().unwrap();
    let bob_id = bob["id"].as_str().unwrap();

    let lamp = create_test_item(&client, alice_id, "Lamp").await;
    let chair = create_test_item(&client, bob_id, "Chair").await;

    let resp = client
        .post(format!("{}/api/offers", BASE_URL))
        .json(&json!({
            "item_offered_id": lamp["id"],
            "item_requested_id": chair["id"],
            "from_user_id": alice_id,
            "to_user_id": bob_id,
        }))
        .send()
        .await
        .unwrap();
    let offer: Value = resp.json().await.unwrap();
    let offer_id = offer["id"].as_str().unwrap();

    // Reject the pending offer
    let resp = client
        .post(format!("{}/api/offers/{}/reject", BASE_URL, offer_id))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let rejected: Value = resp.json().await.unwrap();
    assert_eq!(rejected["status"], "rejected");

    // Withdrawing a rejected offer fails
    let resp = client
        .delete(format!("{}/api/offers/{}", BASE_URL, offer_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Items stay available after a rejection
    let resp = client
        .get(format!(
            "{}/api/items/{}",
            BASE_URL,
            lamp["id"].as_str().unwrap()
        ))
        .send()
        .await
        .unwrap();
    let fetched: Value = resp.json().await.unwrap();
    assert_eq!(fetched["status"], "available");

    delete_user(&client, alice_id).await;
    delete_user(&client, bob_id).await;
}

#[tokio::test]
async fn test_offer_for_same_item_rejected() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let alice = create_test_user(&client).await;
    let alice_id = alice["id"].as_str().unwrap();
    let lamp = create_test_item(&client, alice_id, "Lamp").await;

    let resp = client
        .post(format!("{}/api/offers", BASE_URL))
        .json(&json!({
            "item_offered_id": lamp["id"],
            "item_requested_id": lamp["id"],
            "from_user_id": alice_id,
            "to_user_id": alice_id,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    delete_user(&client, alice_id).await;
}

#[tokio::test]
async fn test_activity_feed_records_mutations() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let user = create_test_user(&client).await;
    let user_id = user["id"].as_str().unwrap();
    create_test_item(&client, user_id, "Activity Probe").await;

    let resp = client
        .get(format!("{}/api/activity?limit=20", BASE_URL))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let entries: Vec<Value> = resp.json().await.unwrap();

    assert!(entries
        .iter()
        .any(|e| e["action"] == "item_created" && e["detail"]["name"] == "Activity Probe"));
    assert!(entries.iter().any(|e| e["action"] == "user_joined"));

    delete_user(&client, user_id).await;
}

/// End-to-end: a WebSocket client receives `item:created` for an item
/// posted over REST, with the matching payload.
#[tokio::test]
async fn test_ws_receives_item_created() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let user = create_test_user(&client).await;
    let user_id = user["id"].as_str().unwrap();

    let (mut ws, _) = connect_async(WS_URL).await.expect("WebSocket connect");

    let item_name = format!("WS Probe {}", Uuid::new_v4().simple());
    let item = create_test_item(&client, user_id, &item_name).await;

    // Scan incoming frames for the matching item:created event. Other tests
    // may be emitting concurrently, so skip unrelated events.
    let mut found = false;
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);

    while !found {
        tokio::select! {
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let msg: Value = serde_json::from_str(&text).expect("valid JSON frame");
                        if msg["event"] == "item:created" && msg["data"]["name"] == item_name.as_str() {
                            assert_eq!(msg["data"]["id"], item["id"]);
                            assert!(msg["timestamp"].is_string());
                            found = true;
                        }
                    }
                    Some(Ok(_)) => {} // pings etc.
                    Some(Err(e)) => panic!("WebSocket error: {e}"),
                    None => panic!("WebSocket closed before event arrived"),
                }
            }
            _ = &mut deadline => {
                panic!("timed out waiting for item:created over WebSocket");
            }
        }
    }

    delete_user(&client, user_id).await;
}

/// Mutations must succeed whether or not anyone is listening: this test runs
/// without any WebSocket connection open from its side.
#[tokio::test]
async fn test_write_path_independent_of_subscribers() {
    if !api_available().await {
        eprintln!("Skipping test: API not available");
        return;
    }

    let client = Client::new();
    let user = create_test_user(&client).await;
    let user_id = user["id"].as_str().unwrap();

    let item = create_test_item(&client, user_id, "No Listeners").await;
    let resp = client
        .delete(format!(
            "{}/api/items/{}",
            BASE_URL,
            item["id"].as_str().unwrap()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    delete_user(&client, user_id).await;
}
