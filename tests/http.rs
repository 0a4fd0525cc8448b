use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    date: String,
    steps: u32,
    calories: u32,
    workout_minutes: u32,
    last_updated: String,
    error: Option<String>,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::Once;
    use std::sync::atomic::{AtomicI32, Ordering};

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("fittrackr_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/dashboard")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let data_path = unique_data_path();
    let child = Command::new(env!("CARGO_BIN_EXE_fittrackr"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", data_path)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn dashboard(client: &Client, base_url: &str) -> DashboardResponse {
    client
        .get(format!("{base_url}/api/dashboard"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for_steps(client: &Client, base_url: &str, steps: u32) -> DashboardResponse {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let snapshot = dashboard(client, base_url).await;
        if snapshot.steps == steps {
            return snapshot;
        }
        if Instant::now() > deadline {
            panic!("dashboard never showed {steps} steps, last: {snapshot:?}");
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn http_fresh_server_reads_zero_with_placeholder() {
    let server = spawn_server().await;
    let client = Client::new();

    let snapshot = dashboard(&client, &server.base_url).await;
    assert_eq!(snapshot.steps, 0);
    assert_eq!(snapshot.calories, 0);
    assert_eq!(snapshot.workout_minutes, 0);
    assert_eq!(snapshot.last_updated, "—");
    assert!(snapshot.error.is_none());
    assert!(!snapshot.date.is_empty());
}

#[tokio::test]
async fn http_workout_save_reaches_dashboard() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/workout", server.base_url))
        .json(&serde_json::json!({ "steps": 4200, "calories": 320, "workout_minutes": 35 }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let snapshot = wait_for_steps(&client, &server.base_url, 4200).await;
    assert_eq!(snapshot.calories, 320);
    assert_eq!(snapshot.workout_minutes, 35);
    assert_ne!(snapshot.last_updated, "—");
}

#[tokio::test]
async fn http_partial_workout_preserves_other_fields() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    for body in [
        serde_json::json!({ "steps": 7000, "calories": 500, "workout_minutes": 50 }),
        serde_json::json!({ "workout_minutes": 25 }),
    ] {
        let response = client
            .post(format!("{}/api/workout", server.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    let snapshot = wait_for_steps(&client, &server.base_url, 7000).await;
    assert_eq!(snapshot.calories, 500);
    assert_eq!(snapshot.workout_minutes, 25);
}

#[tokio::test]
async fn http_empty_workout_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = dashboard(&client, &server.base_url).await;

    let response = client
        .post(format!("{}/api/workout", server.base_url))
        .json(&serde_json::json!({ "steps": 0, "calories": 0, "workout_minutes": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let after = dashboard(&client, &server.base_url).await;
    assert_eq!(after.steps, before.steps);
    assert_eq!(after.calories, before.calories);
    assert_eq!(after.workout_minutes, before.workout_minutes);
}

#[tokio::test]
async fn http_sleep_and_nutrition_do_not_change_dashboard() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = dashboard(&client, &server.base_url).await;

    let response = client
        .post(format!("{}/api/sleep", server.base_url))
        .json(&serde_json::json!({ "hours_slept": 7.5, "quality": "Good", "notes": "" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = client
        .post(format!("{}/api/nutrition", server.base_url))
        .json(&serde_json::json!({ "meal_name": "Oats", "calories": 350 }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let after = dashboard(&client, &server.base_url).await;
    assert_eq!(after.steps, before.steps);
    assert_eq!(after.calories, before.calories);
    assert_eq!(after.workout_minutes, before.workout_minutes);
}

#[tokio::test]
async fn http_sleep_without_hours_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/sleep", server.base_url))
        .json(&serde_json::json!({ "hours_slept": 0.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_manual_refresh_returns_snapshot() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/dashboard/refresh", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let refreshed: DashboardResponse = response.json().await.unwrap();
    let current = dashboard(&client, &server.base_url).await;
    assert_eq!(refreshed.steps, current.steps);
}

#[tokio::test]
async fn http_register_login_flow() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/register", server.base_url))
        .json(&serde_json::json!({
            "name": "Alex",
            "email": "alex@example.com",
            "password": "secret1"
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = client
        .post(format!("{}/api/login", server.base_url))
        .json(&serde_json::json!({ "email": "alex@example.com", "password": "secret1" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = client
        .post(format!("{}/api/login", server.base_url))
        .json(&serde_json::json!({ "email": "alex@example.com", "password": "wrong-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let response = client
        .post(format!("{}/api/register", server.base_url))
        .json(&serde_json::json!({
            "name": "Alex Again",
            "email": "ALEX@example.com",
            "password": "another1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn http_index_serves_dashboard_page() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client.get(&server.base_url).send().await.unwrap();
    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("FitTrackr Dashboard"));
    assert!(body.contains("Log workout"));
}
