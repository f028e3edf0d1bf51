// tests/api_tests.rs

use std::{sync::Arc, time::Duration};

use mock_exam::{
    config::Config,
    models::question::Category,
    routes,
    services::{clock::SystemClock, engine::MockExamEngine, free_pool::FreeQuestionPool},
    state::AppState,
    store::{MemoryQuestionCatalog, MemorySessionStore},
    utils::jwt::sign_jwt,
};

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    catalog: Arc<MemoryQuestionCatalog>,
}

/// Helper function to spawn the app on a random port for testing,
/// backed by in-memory stores.
async fn spawn_app() -> TestApp {
    let config = Config {
        database_url: "unused".to_string(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        pool_refresh_interval: Duration::from_secs(24 * 60 * 60),
        timer_retry_backoff: Duration::from_secs(1),
    };

    let catalog = Arc::new(MemoryQuestionCatalog::new());
    let engine = MockExamEngine::new(
        Arc::new(MemorySessionStore::new()),
        catalog.clone(),
        Arc::new(SystemClock),
        config.timer_retry_backoff,
    );
    let free_pool = Arc::new(FreeQuestionPool::new(catalog.clone()));

    let state = AppState {
        config,
        engine,
        free_pool,
        catalog: catalog.clone(),
    };
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, catalog }
}

fn token(user_id: i64, role: &str, premium: bool) -> String {
    sign_jwt(user_id, role, premium, SECRET, 600).unwrap()
}

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/mock-exam", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .get(&format!("{}/api/mock-exam", app.address))
        .header("Authorization", "Bearer not-a-token")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn start_fails_validation() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: ask for fewer questions than allowed
    let response = client
        .post(&format!("{}/api/mock-exams", app.address))
        .header("Authorization", format!("Bearer {}", token(1, "user", false)))
        .json(&serde_json::json!({
            "category": "METEOROLOGY",
            "max_questions": 5,
            "time_limit_secs": 600
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_mock_exam_flow() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    for _ in 0..25 {
        app.catalog.insert_accepted(Category::Meteorology, "A").await;
    }
    let auth = format!("Bearer {}", token(10, "user", false));

    // 1. No ongoing exam yet
    let current = client
        .get(&format!("{}/api/mock-exam", app.address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(current.status().as_u16(), 404);

    // 2. Start
    let start_body = serde_json::json!({
        "category": "METEOROLOGY",
        "max_questions": 20,
        "time_limit_secs": 600
    });
    let started = client
        .post(&format!("{}/api/mock-exams", app.address))
        .header("Authorization", &auth)
        .json(&start_body)
        .send()
        .await
        .unwrap();
    assert_eq!(started.status().as_u16(), 201);
    let session: serde_json::Value = started.json().await.unwrap();
    assert_eq!(session["status"], "ONGOING");
    assert_eq!(session["correctness_ratio"], 1.0);
    let session_id = session["id"].as_str().unwrap().to_string();
    let mut question_id = session["current_question_id"].as_i64().unwrap();

    let next: serde_json::Value = client
        .get(&format!("{}/api/mock-exam/next", app.address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(next["question_id"], question_id);

    // 3. A second start is refused
    let again = client
        .post(&format!("{}/api/mock-exams", app.address))
        .header("Authorization", &auth)
        .json(&start_body)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    // 4. Answering another question is refused
    let wrong_question = if question_id == 1 { 2 } else { 1 };
    let mismatch = client
        .post(&format!("{}/api/mock-exam/answer", app.address))
        .header("Authorization", &auth)
        .json(&serde_json::json!({ "question_id": wrong_question, "answer": "A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(mismatch.status().as_u16(), 409);

    // 5. Answer the whole budget, half of it correctly
    let mut last = serde_json::Value::Null;
    for i in 0..20 {
        let answer = if i % 2 == 0 { "A" } else { "B" };
        let response = client
            .post(&format!("{}/api/mock-exam/answer", app.address))
            .header("Authorization", &auth)
            .json(&serde_json::json!({ "question_id": question_id, "answer": answer }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        last = response.json().await.unwrap();
        assert_eq!(last["is_correct"], i % 2 == 0);
        if let Some(next) = last["next_question_id"].as_i64() {
            question_id = next;
        }
    }
    assert!(last["next_question_id"].is_null());
    assert_eq!(last["session"]["status"], "FINISHED");
    assert_eq!(last["session"]["correctness_ratio"], 0.5);

    // 6. Nothing ongoing anymore
    let stop = client
        .patch(&format!("{}/api/mock-exam/stop", app.address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(stop.status().as_u16(), 404);

    // 7. The exam shows up in the history
    let history: serde_json::Value = client
        .get(&format!("{}/api/mock-exams?page=1", app.address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["id"], session_id.as_str());

    // 8. Only the owner or an admin may open it
    let url = format!("{}/api/mock-exam/{}", app.address, session_id);
    let own = client.get(&url).header("Authorization", &auth).send().await.unwrap();
    assert_eq!(own.status().as_u16(), 200);

    let stranger = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", token(11, "user", false)))
        .send()
        .await
        .unwrap();
    assert_eq!(stranger.status().as_u16(), 403);

    let admin = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", token(1, "admin", false)))
        .send()
        .await
        .unwrap();
    assert_eq!(admin.status().as_u16(), 200);
}

#[tokio::test]
async fn test_stop_current_exam() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    app.catalog.insert_accepted(Category::AirLaw, "A").await;
    let auth = format!("Bearer {}", token(20, "user", false));

    client
        .post(&format!("{}/api/mock-exams", app.address))
        .header("Authorization", &auth)
        .json(&serde_json::json!({
            "category": "AIR_LAW",
            "max_questions": 20,
            "time_limit_secs": 300
        }))
        .send()
        .await
        .unwrap();

    let stop = client
        .patch(&format!("{}/api/mock-exam/stop", app.address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(stop.status().as_u16(), 200);
    let session: serde_json::Value = stop.json().await.unwrap();
    assert_eq!(session["status"], "FINISHED");
    assert_eq!(session["correctness_ratio"], 0.0);
    assert!(session["ended_at"].is_string());

    let next = client
        .get(&format!("{}/api/mock-exam/next", app.address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(next.status().as_u16(), 404);
}

#[tokio::test]
async fn next_question_is_404_for_an_empty_category() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let auth = format!("Bearer {}", token(21, "user", false));

    let started = client
        .post(&format!("{}/api/mock-exams", app.address))
        .header("Authorization", &auth)
        .json(&serde_json::json!({
            "category": "GENERAL_NAVIGATION",
            "max_questions": 20,
            "time_limit_secs": 300
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(started.status().as_u16(), 201);

    let next = client
        .get(&format!("{}/api/mock-exam/next", app.address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(next.status().as_u16(), 404);
}

#[tokio::test]
async fn test_free_question_pool() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    for category in [Category::AirLaw, Category::Meteorology] {
        for _ in 0..5 {
            app.catalog.insert_accepted(category, "A").await;
        }
    }
    let user = format!("Bearer {}", token(30, "user", false));
    let premium = format!("Bearer {}", token(31, "user", true));
    let admin = format!("Bearer {}", token(1, "admin", false));

    // Empty until the first refresh
    let ids: Vec<i64> = client
        .get(&format!("{}/api/free-questions", app.address))
        .header("Authorization", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(ids.is_empty());

    // Refresh is admin only
    let refresh_url = format!("{}/api/admin/free-questions/refresh", app.address);
    let forbidden = client.post(&refresh_url).header("Authorization", &user).send().await.unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    let refreshed: serde_json::Value = client
        .post(&refresh_url)
        .header("Authorization", &admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["size"], 4);

    let ids: Vec<i64> = client
        .get(&format!("{}/api/free-questions", app.address))
        .header("Authorization", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ids.len(), 4);

    let free_id = ids[0];
    let locked_id = (1..=10).find(|id| !ids.contains(id)).unwrap();

    let free: serde_json::Value = client
        .get(&format!("{}/api/free-questions/{}", app.address, free_id))
        .header("Authorization", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(free["free"], true);
    assert_eq!(free["accessible"], true);

    let locked: serde_json::Value = client
        .get(&format!("{}/api/free-questions/{}", app.address, locked_id))
        .header("Authorization", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(locked["free"], false);
    assert_eq!(locked["accessible"], false);

    let unlocked: serde_json::Value = client
        .get(&format!("{}/api/free-questions/{}", app.address, locked_id))
        .header("Authorization", &premium)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unlocked["accessible"], true);
}
