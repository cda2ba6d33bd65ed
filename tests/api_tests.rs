// tests/api_tests.rs

use std::sync::Arc;

use gre_practice::{
    config::Config,
    models::{
        question::{QuestionDraft, Section},
        result::NewTestResult,
    },
    repository::{Repository, memory::MemoryRepository},
    routes,
    state::AppState,
    utils::{hash::hash_password, jwt::ADMIN_ROLE},
};
use serde_json::{Value, json};

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL and the in-memory backend behind it.
async fn spawn_app() -> (String, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());

    let config = Config {
        database_url: "memory".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        repo: repo.clone(),
        config,
    };

    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, repo)
}

fn draft(text: &str, section: Section, options: [&str; 2], correct: &str) -> QuestionDraft {
    QuestionDraft {
        question_text: text.to_string(),
        section_type: section,
        option_a: Some(options[0].to_string()),
        option_b: Some(options[1].to_string()),
        option_c: None,
        option_d: None,
        correct_option: correct.to_string(),
    }
}

/// One published test: a Verbal question answered by B and a Quant question answered by A.
fn seed_paris_test(repo: &MemoryRepository) -> (i64, i64, i64) {
    let test_id = repo.seed_test("GRE Mock 1", true);
    let verbal = repo.seed_question(
        &draft("Capital of France?", Section::Verbal, ["Rome", "Paris"], "Paris"),
        Some(test_id),
    );
    let quant = repo.seed_question(
        &draft("2 + 2 = ?", Section::Quant, ["4", "5"], "4"),
        Some(test_id),
    );
    (test_id, verbal, quant)
}

async fn start(
    client: &reqwest::Client,
    address: &str,
    test_id: i64,
    name: &str,
    email: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/api/tests/{}/start", address, test_id))
        .json(&json!({"name": name, "email": email}))
        .send()
        .await
        .expect("Failed to execute request")
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> reqwest::Response {
    client
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request")
}

/// Starts, answers both questions correctly and submits. Returns the submit body.
async fn complete_attempt(
    client: &reqwest::Client,
    address: &str,
    test_id: i64,
    ids: (i64, i64),
    email: &str,
) -> Value {
    let started: Value = start(client, address, test_id, "Ada", email)
        .await
        .json()
        .await
        .unwrap();
    let token = started["token"].as_str().unwrap().to_string();
    let base = format!("{}/api/sessions/{}", address, token);

    post(client, format!("{base}/answers"), json!({"question_id": ids.0, "option": "B"})).await;
    post(client, format!("{base}/next"), json!({})).await;
    post(client, format!("{base}/answers"), json!({"question_id": ids.1, "option": "A"})).await;

    post(client, format!("{base}/submit"), json!({}))
        .await
        .json()
        .await
        .unwrap()
}

async fn admin_token(client: &reqwest::Client, address: &str, repo: &MemoryRepository) -> String {
    let hash = hash_password("secret-pass").unwrap();
    repo.create_user("admin", &hash, ADMIN_ROLE).await.unwrap();

    let body: Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({"username": "admin", "password": "secret-pass"}))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();

    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let (address, _repo) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn published_tests_are_listed_oldest_first() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();

    let first = repo.seed_test("First", true);
    repo.seed_test("Hidden", false);
    let third = repo.seed_test("Third", true);

    let tests: Vec<Value> = client
        .get(format!("{}/api/tests", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: Vec<i64> = tests.iter().map(|t| t["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![first, third]);
}

#[tokio::test]
async fn start_requires_name_and_email() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, _, _) = seed_paris_test(&repo);

    let response = start(&client, &address, test_id, "  ", "ada@example.com").await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Please enter your name and email");
}

#[tokio::test]
async fn start_unknown_or_unpublished_test_is_404() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let draft_id = repo.seed_test("Draft", false);

    let response = start(&client, &address, draft_id, "Ada", "ada@example.com").await;
    assert_eq!(response.status().as_u16(), 404);

    let response = start(&client, &address, 9999, "Ada", "ada@example.com").await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn start_opens_session_on_first_verbal_question() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, verbal, _) = seed_paris_test(&repo);

    let response = start(&client, &address, test_id, "Ada", "ada@example.com").await;
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["test_title"], "GRE Mock 1");
    assert_eq!(body["attempt_no"], 1);
    assert_eq!(body["session"]["section"], "VERBAL");
    assert_eq!(body["session"]["active_question"], 1);
    assert_eq!(body["session"]["question"]["id"], verbal);
    assert_eq!(body["session"]["forward_action"], "next");
    assert!(body["session"]["question"].get("correct_option").is_none());
}

#[tokio::test]
async fn gate_blocks_after_two_attempts() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, _, _) = seed_paris_test(&repo);

    repo.upsert_result(&NewTestResult {
        student_name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        score: 1,
        test_id,
        attempt_no: 2,
    })
    .await
    .unwrap();

    let response = start(&client, &address, test_id, "Ada", "ada@example.com").await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Free trial ended. You have used all your attempts.");

    // Other students and other tests are unaffected
    let response = start(&client, &address, test_id, "Bob", "bob@example.com").await;
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn gate_failure_is_503_and_creates_no_session() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, _, _) = seed_paris_test(&repo);

    repo.fail_reads(true);
    let response = start(&client, &address, test_id, "Ada", "ada@example.com").await;
    assert_eq!(response.status().as_u16(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Something went wrong. Please try again.");
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn full_attempt_scores_and_records_once() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, verbal, quant) = seed_paris_test(&repo);

    let started: Value = start(&client, &address, test_id, "Ada", "ada@example.com")
        .await
        .json()
        .await
        .unwrap();
    let token = started["token"].as_str().unwrap().to_string();
    let base = format!("{}/api/sessions/{}", address, token);

    let view: Value = post(&client, format!("{base}/answers"), json!({"question_id": verbal, "option": "B"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(view["selected"], "B");
    assert_eq!(view["active_question"], 1);

    // Submitting from the Verbal section is refused
    let early = post(&client, format!("{base}/submit"), json!({})).await;
    assert_eq!(early.status().as_u16(), 409);

    let view: Value = post(&client, format!("{base}/next"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(view["section"], "QUANT");
    assert_eq!(view["active_question"], 1);
    assert_eq!(view["forward_action"], "submit");
    assert_eq!(view["can_go_back"], false);

    post(&client, format!("{base}/answers"), json!({"question_id": quant, "option": "A"})).await;

    let response = post(&client, format!("{base}/submit"), json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 2);
    assert_eq!(result["total"], 2);
    assert_eq!(result["attempt_no"], 1);
    assert_eq!(result["recorded"], true);
    assert!(result["warning"].is_null());

    // A second submit reports the same score without another write
    let again: Value = post(&client, format!("{base}/submit"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["score"], 2);
    assert_eq!(again["recorded"], false);

    let stored = repo.results();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].score, 2);
    assert_eq!(stored[0].attempt_no, 1);

    let fetched: Value = client
        .get(format!("{base}/result"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["score"], 2);
    assert_eq!(fetched["verdicts"][0]["verdict"], "correct");
}

#[tokio::test]
async fn second_attempt_overwrites_and_third_is_refused() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, verbal, quant) = seed_paris_test(&repo);

    let first = complete_attempt(&client, &address, test_id, (verbal, quant), "ada@example.com").await;
    assert_eq!(first["attempt_no"], 1);

    let second = complete_attempt(&client, &address, test_id, (verbal, quant), "ada@example.com").await;
    assert_eq!(second["attempt_no"], 2);
    assert_eq!(second["recorded"], true);

    let stored = repo.results();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].attempt_no, 2);

    let third = start(&client, &address, test_id, "Ada", "ada@example.com").await;
    assert_eq!(third.status().as_u16(), 403);
}

#[tokio::test]
async fn failed_result_write_still_returns_score() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, verbal, quant) = seed_paris_test(&repo);

    repo.fail_result_writes(true);
    let result = complete_attempt(&client, &address, test_id, (verbal, quant), "ada@example.com").await;

    assert_eq!(result["score"], 2);
    assert_eq!(result["recorded"], false);
    assert_eq!(
        result["warning"],
        "Warning: usage limit not updated. Please contact support if issues persist."
    );
    assert!(repo.results().is_empty());
}

#[tokio::test]
async fn previous_and_jump_stay_inside_section() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let test_id = repo.seed_test("Verbal heavy", true);
    for n in 1..=3 {
        repo.seed_question(
            &draft(&format!("V{n}"), Section::Verbal, ["x", "y"], "x"),
            Some(test_id),
        );
    }
    repo.seed_question(&draft("Q1", Section::Quant, ["1", "2"], "1"), Some(test_id));

    let started: Value = start(&client, &address, test_id, "Ada", "ada@example.com")
        .await
        .json()
        .await
        .unwrap();
    let base = format!("{}/api/sessions/{}", address, started["token"].as_str().unwrap());

    let view: Value = post(&client, format!("{base}/jump"), json!({"question": 3}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(view["active_question"], 3);
    assert_eq!(view["palette"][2]["active"], true);

    let view: Value = post(&client, format!("{base}/previous"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(view["active_question"], 2);

    let out_of_range = post(&client, format!("{base}/jump"), json!({"question": 4})).await;
    assert_eq!(out_of_range.status().as_u16(), 400);

    let view: Value = client
        .get(&base)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["section"], "VERBAL");
    assert_eq!(view["section_len"], 3);
}

#[tokio::test]
async fn reset_clears_session() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, verbal, _) = seed_paris_test(&repo);

    let started: Value = start(&client, &address, test_id, "Ada", "ada@example.com")
        .await
        .json()
        .await
        .unwrap();
    let base = format!("{}/api/sessions/{}", address, started["token"].as_str().unwrap());
    post(&client, format!("{base}/answers"), json!({"question_id": verbal, "option": "A"})).await;

    let response = client.delete(&base).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let view: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert!(view["test_id"].is_null());
    assert_eq!(view["answered"], 0);
    assert_eq!(view["total_questions"], 0);

    let response = post(&client, format!("{base}/next"), json!({})).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (address, _repo) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/sessions/{}", address, uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let (address, _repo) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/admin/questions", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    admin_token(&client, &address, &repo).await;

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({"username": "admin", "password": "wrong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_manages_questions() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address, &repo).await;

    // Correct option must be one of the option texts
    let response = client
        .post(format!("{}/api/admin/questions", address))
        .bearer_auth(&token)
        .json(&json!({
            "question_text": "Capital of France?",
            "option_a": "Rome",
            "option_b": "Paris",
            "correct_option": "B"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .post(format!("{}/api/admin/questions", address))
        .bearer_auth(&token)
        .json(&json!({
            "question_text": "Capital of France?",
            "section_type": "verbal",
            "option_a": "Rome",
            "option_b": "Paris",
            "correct_option": "Paris"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let response = client
        .put(format!("{}/api/admin/questions/{}", address, id))
        .bearer_auth(&token)
        .json(&json!({"section_type": "QUANT"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let quant: Vec<Value> = client
        .get(format!("{}/api/admin/questions?section=QUANT", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(quant.len(), 1);
    assert_eq!(quant[0]["correct_option"], "Paris");

    let response = client
        .delete(format!("{}/api/admin/questions/{}", address, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    assert!(repo.get_question(id).await.unwrap().is_none());
}

#[tokio::test]
async fn import_reports_bad_row_and_writes_nothing() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address, &repo).await;
    let test_id = repo.seed_test("Imported", true);

    let response = client
        .post(format!("{}/api/admin/questions/import", address))
        .bearer_auth(&token)
        .json(&json!({
            "rows": [
                {"question_text": "2 + 2", "section_type": "QUANT", "option_a": 4, "option_b": 5, "correct_option": 4},
                {"question_text": "", "option_a": "x", "correct_option": "x"}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Row 3: question_text is required");
    assert!(repo.list_questions(None).await.unwrap().is_empty());

    let response = client
        .post(format!("{}/api/admin/questions/import", address))
        .bearer_auth(&token)
        .json(&json!({
            "test_id": test_id,
            "rows": [
                {"question_text": "2 + 2", "section_type": "QUANT", "option_a": 4, "option_b": 5, "correct_option": 4}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["imported"], 1);
    assert_eq!(repo.fetch_questions_for_test(test_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn admin_manages_tests_and_results() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address, &repo).await;

    let created: Value = client
        .post(format!("{}/api/admin/tests", address))
        .bearer_auth(&token)
        .json(&json!({"title": "GRE Mock 2"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let test_id = created["id"].as_i64().unwrap();
    assert_eq!(created["is_published"], false);

    let q1 = repo.seed_question(&draft("V", Section::Verbal, ["a", "b"], "a"), None);
    let q2 = repo.seed_question(&draft("Q", Section::Quant, ["1", "2"], "2"), None);

    let response = client
        .put(format!("{}/api/admin/tests/{}/questions", address, test_id))
        .bearer_auth(&token)
        .json(&json!({"question_ids": [q1, q1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .put(format!("{}/api/admin/tests/{}/questions", address, test_id))
        .bearer_auth(&token)
        .json(&json!({"question_ids": [q1, q2]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let updated: Value = client
        .put(format!("{}/api/admin/tests/{}", address, test_id))
        .bearer_auth(&token)
        .json(&json!({"is_published": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["is_published"], true);

    let result = complete_attempt(&client, &address, test_id, (q1, q2), "ada@example.com").await;
    // Verbal answered B ("b") is wrong; Quant answered A ("1") is wrong
    assert_eq!(result["score"], 0);

    let results: Vec<Value> = client
        .get(format!("{}/api/admin/tests/{}/results", address, test_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["email"], "ada@example.com");

    let response = client
        .delete(format!("{}/api/admin/tests/{}", address, test_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    assert!(repo.results().is_empty());
}

#[tokio::test]
async fn question_text_reaches_students_unchanged() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address, &repo).await;

    let created: Value = client
        .post(format!("{}/api/admin/tests", address))
        .bearer_auth(&token)
        .json(&json!({"title": "Quant <Hard> & Fast", "is_published": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["title"], "Quant <Hard> & Fast");
    let test_id = created["id"].as_i64().unwrap();

    let response = client
        .post(format!("{}/api/admin/questions/import", address))
        .bearer_auth(&token)
        .json(&json!({
            "test_id": test_id,
            "rows": [{
                "question_text": "If x < 5 & y > 2, which is greater?",
                "section_type": "VERBAL",
                "option_a": "x",
                "option_b": "y",
                "correct_option": "y"
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let started: Value = start(&client, &address, test_id, "Ada", "ada@example.com")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(started["test_title"], "Quant <Hard> & Fast");
    assert_eq!(
        started["session"]["question"]["question_text"],
        "If x < 5 & y > 2, which is greater?"
    );
}

#[tokio::test]
async fn unsaved_latch_skips_result_write_until_retry() {
    let (address, repo) = spawn_app().await;
    let client = reqwest::Client::new();
    let (test_id, verbal, quant) = seed_paris_test(&repo);

    let started: Value = start(&client, &address, test_id, "Ada", "ada@example.com")
        .await
        .json()
        .await
        .unwrap();
    let base = format!("{}/api/sessions/{}", address, started["token"].as_str().unwrap());
    post(&client, format!("{base}/answers"), json!({"question_id": verbal, "option": "B"})).await;
    post(&client, format!("{base}/next"), json!({})).await;
    post(&client, format!("{base}/answers"), json!({"question_id": quant, "option": "A"})).await;

    repo.fail_session_writes(true);
    let first: Value = post(&client, format!("{base}/submit"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["score"], 2);
    assert_eq!(first["recorded"], false);
    assert_eq!(
        first["warning"],
        "Warning: usage limit not updated. Please contact support if issues persist."
    );
    assert!(repo.results().is_empty());

    repo.fail_session_writes(false);
    let retry: Value = post(&client, format!("{base}/submit"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(retry["recorded"], true);

    let again: Value = post(&client, format!("{base}/submit"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["recorded"], false);
    assert_eq!(repo.results().len(), 1);
}
