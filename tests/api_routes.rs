use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use food_lens::api::{ApiConfig, ApiHandle, ApiServer};
use food_lens::{
    BackendRegistry, BoundingBox, CalorieTable, DetectionSession, FixedClock, FoodLog,
    FoodTracker, PendingBoard, RawDetection, Stabilizer, StabilizerSettings,
};

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

struct TestApi {
    board: PendingBoard,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new() -> Result<Self> {
        let now = NaiveDate::from_ymd_opt(2026, 5, 20)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let log = FoodLog::in_memory(Arc::new(FixedClock::new(now)))?;
        let tracker = FoodTracker::shared(CalorieTable::builtin(), log);
        let board = PendingBoard::new();

        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let api_handle = ApiServer::new(api_config, tracker, board.clone()).spawn()?;

        Ok(Self {
            board,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn request(&self, method: &str, path: &str, body: Option<&str>) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        let request = match body {
            Some(body) => format!(
                "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ),
            None => format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"),
        };
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let (headers, body) = self.request("GET", path, None)?;
        assert!(headers.contains("200 OK"), "GET {path}: {headers}");
        Ok(serde_json::from_str(&body)?)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn health_endpoint_reports_ok() -> Result<()> {
    let api = TestApi::new()?;
    let (headers, body) = api.request("GET", "/health", None)?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""status":"ok""#));
    Ok(())
}

#[test]
fn foods_endpoint_lists_calorie_table() -> Result<()> {
    let api = TestApi::new()?;
    let value = api.get_json("/foods")?;
    let foods = value["foods"].as_array().expect("foods array");
    assert_eq!(foods.len(), 10);
    assert!(foods
        .iter()
        .any(|f| f["label"] == "Pizza" && f["calories"] == 285));
    Ok(())
}

#[test]
fn confirm_logs_food_and_updates_summaries() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, body) = api.request(
        "POST",
        "/detections",
        Some(r#"{"food": "Apple", "confidence": 0.87}"#),
    )?;
    assert!(headers.contains("200 OK"));
    let confirmed: Value = serde_json::from_str(&body)?;
    assert_eq!(confirmed["success"], true);
    assert_eq!(confirmed["calories"], 95);
    assert!(confirmed["timestamp"]
        .as_str()
        .unwrap()
        .starts_with("2026-05-20T08:30:00"));

    api.request("POST", "/detections", Some(r#"{"food": "Pizza", "confidence": 0.9}"#))?;

    let today = api.get_json("/detections/today")?;
    let items = today["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["food"], "Pizza");

    let summary = api.get_json("/summary/daily")?;
    assert_eq!(summary["total_calories"], 380);
    assert_eq!(summary["detection_count"], 2);

    let weekly = api.get_json("/summary/weekly")?;
    assert_eq!(weekly.as_object().unwrap().len(), 7);
    assert_eq!(weekly["2026-05-20"]["total_calories"], 380);
    assert_eq!(weekly["2026-05-14"]["total_calories"], 0);
    let (_, weekly_body) = api.request("GET", "/summary/weekly", None)?;
    let today = weekly_body.find("2026-05-20").expect("today in weekly summary");
    let oldest = weekly_body.find("2026-05-14").expect("oldest in weekly summary");
    assert!(today < oldest);

    let stats = api.get_json("/stats")?;
    assert_eq!(stats["total_detections"], 2);
    assert_eq!(stats["days_tracked"], 1);
    assert_eq!(stats["most_detected_food"], "Apple");

    let nutrition = api.get_json("/nutrition/today")?;
    let categories = nutrition["categories"].as_array().expect("categories");
    assert!(categories
        .iter()
        .any(|c| c["category"] == "Fruit" && c["calories"] == 95));
    Ok(())
}

#[test]
fn confirm_without_food_is_rejected() -> Result<()> {
    let api = TestApi::new()?;
    let (headers, body) = api.request("POST", "/detections", Some(r#"{"confidence": 0.5}"#))?;
    assert!(headers.contains("400"));
    assert!(body.contains("No food item specified"));

    let (headers, _) = api.request("POST", "/detections", Some("not json"))?;
    assert!(headers.contains("400"));

    let recent = api.get_json("/detections/recent")?;
    assert!(recent["items"].as_array().unwrap().is_empty());
    Ok(())
}

#[test]
fn delete_removes_record_by_timestamp() -> Result<()> {
    let api = TestApi::new()?;
    let (_, body) = api.request("POST", "/detections", Some(r#"{"food": "Banana"}"#))?;
    let confirmed: Value = serde_json::from_str(&body)?;
    let id = confirmed["timestamp"].as_str().unwrap().to_string();

    let (headers, body) = api.request("DELETE", &format!("/detections/{id}"), None)?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""success":true"#));

    let (headers, _) = api.request("POST", &format!("/detections/{id}/delete"), None)?;
    assert!(headers.contains("404"));

    let summary = api.get_json("/summary/daily")?;
    assert_eq!(summary["total_calories"], 0);
    Ok(())
}

#[test]
fn query_parameters_are_validated() -> Result<()> {
    let api = TestApi::new()?;
    for food in ["Apple", "Banana", "Carrot"] {
        api.request("POST", "/detections", Some(&format!(r#"{{"food": "{food}"}}"#)))?;
    }

    let recent = api.get_json("/detections/recent?limit=2")?;
    let items = recent["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["food"], "Banana");

    let recent = api.get_json("/detections/recent?limit=0")?;
    assert!(recent["items"].as_array().unwrap().is_empty());

    let (headers, _) = api.request("GET", "/detections/recent?limit=many", None)?;
    assert!(headers.contains("400"));

    let (headers, _) = api.request("GET", "/summary/daily?date=2026-13-01", None)?;
    assert!(headers.contains("400"));

    let other_day = api.get_json("/summary/daily?date=2026-05-19")?;
    assert_eq!(other_day["total_calories"], 0);
    Ok(())
}

#[test]
fn unknown_paths_and_methods() -> Result<()> {
    let api = TestApi::new()?;
    let (headers, _) = api.request("GET", "/nope", None)?;
    assert!(headers.contains("404"));
    let (headers, _) = api.request("POST", "/stats", None)?;
    assert!(headers.contains("405"));
    Ok(())
}

#[test]
fn pending_board_is_served_and_confirmations_clear_it() -> Result<()> {
    let api = TestApi::new()?;
    let mut session = DetectionSession::new(
        Stabilizer::new(StabilizerSettings::default(), ["Apple"]),
        BackendRegistry::new(),
        api.board.clone(),
    );
    let apple = RawDetection::new("Apple", 0.92, BoundingBox::new(12.7, 40.2, 110.0, 150.0));
    let t0 = Instant::now();
    session.process_detections(&[apple.clone()], t0);
    session.process_detections(&[apple.clone()], t0 + Duration::from_millis(600));

    let pending = api.get_json("/pending")?;
    let detections = pending["detections"].as_array().expect("detections");
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["food"], "Apple");
    let bbox = detections[0]["bbox"].clone();
    assert_eq!(bbox, serde_json::json!([12, 40, 110, 150]));

    let body = format!(r#"{{"food": "Apple", "confidence": 0.92, "bbox": {bbox}}}"#);
    let (headers, _) = api.request("POST", "/detections", Some(&body))?;
    assert!(headers.contains("200 OK"));

    let pending = api.get_json("/pending")?;
    assert!(pending["detections"].as_array().unwrap().is_empty());

    let next = session.process_detections(&[apple], t0 + Duration::from_millis(700));
    assert!(next.is_empty());
    Ok(())
}
