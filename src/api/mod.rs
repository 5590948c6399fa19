//! JSON HTTP surface over the food tracker and the live pending board.
//!
//! One listener thread serves requests sequentially. All writes go through
//! [`FoodTracker`], which serializes them internally.

use crate::calories::NutritionalSummary;
use crate::session::PendingBoard;
use crate::stabilizer::IdentityKey;
use crate::tracker::FoodTracker;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 16 * 1024;
const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    tracker: Arc<FoodTracker>,
    board: PendingBoard,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, tracker: Arc<FoodTracker>, board: PendingBoard) -> Self {
        Self {
            cfg,
            tracker,
            board,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &self.tracker, &self.board, shutdown_thread) {
                log::error!("food api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    tracker: &FoodTracker,
    board: &PendingBoard,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, tracker, board) {
                    log::warn!("food api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// HTTP status plus JSON body.
type Reply = (u16, serde_json::Value);

fn handle_connection(
    mut stream: TcpStream,
    tracker: &FoodTracker,
    board: &PendingBoard,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, &json!({"error": "forbidden"}))?;
        return Ok(());
    }

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_json_response(&mut stream, 400, &json!({"error": "bad_request"}))?;
            return Err(err);
        }
    };
    let (status, body) = match route(&request, tracker, board) {
        Ok(reply) => reply,
        Err(err) => {
            log::error!("{} {} failed: {}", request.method, request.path, err);
            (500, json!({"error": "internal_error"}))
        }
    };
    write_json_response(&mut stream, status, &body)
}

#[derive(Debug, Deserialize)]
struct ConfirmBody {
    food: Option<String>,
    #[serde(default)]
    confidence: f64,
    bbox: Option<[i32; 4]>,
}

fn route(request: &HttpRequest, tracker: &FoodTracker, board: &PendingBoard) -> Result<Reply> {
    let segments: Vec<&str> = request
        .path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let method = request.method.as_str();

    let reply = match (method, segments.as_slice()) {
        ("GET", ["health"]) => (200, json!({"status": "ok"})),
        ("GET", ["foods"]) => (200, json!({"foods": tracker.calorie_table().entries()})),
        ("GET", ["pending"]) => (200, json!({"detections": board.current()})),
        ("POST", ["detections"]) => confirm_detection(request, tracker, board)?,
        ("DELETE", ["detections", id]) | ("POST", ["detections", id, "delete"]) => {
            delete_detection(&percent_decode(id), tracker)?
        }
        ("GET", ["detections", "today"]) => {
            (200, json!({"items": tracker.todays_items()?}))
        }
        ("GET", ["detections", "recent"]) => {
            let limit = match request.query.get("limit") {
                Some(raw) => match raw.parse::<usize>() {
                    Ok(limit) => limit,
                    Err(_) => return Ok((400, json!({"error": "invalid_limit"}))),
                },
                None => DEFAULT_RECENT_LIMIT,
            };
            (200, json!({"items": tracker.recent(limit)?}))
        }
        ("GET", ["summary", "daily"]) => {
            let date = match request.query.get("date") {
                Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    Ok(date) => Some(date),
                    Err(_) => return Ok((400, json!({"error": "invalid_date"}))),
                },
                None => None,
            };
            (200, serde_json::to_value(tracker.daily_summary(date)?)?)
        }
        ("GET", ["summary", "weekly"]) => (200, serde_json::to_value(tracker.weekly_summary()?)?),
        ("GET", ["stats"]) => (200, serde_json::to_value(tracker.all_time_stats()?)?),
        ("GET", ["nutrition", "today"]) => (200, nutrition_json(tracker.todays_nutrition()?)),
        (_, ["health"])
        | (_, ["foods"])
        | (_, ["pending"])
        | (_, ["detections", ..])
        | (_, ["summary", _])
        | (_, ["stats"])
        | (_, ["nutrition", "today"]) => (405, json!({"error": "method_not_allowed"})),
        _ => (404, json!({"error": "not_found"})),
    };
    Ok(reply)
}

/// `{"categories": [{category, count, calories, foods}]}` in summary order.
pub(crate) fn nutrition_json(summary: NutritionalSummary) -> serde_json::Value {
    let categories: Vec<serde_json::Value> = summary
        .into_iter()
        .map(|(category, totals)| {
            json!({
                "category": category,
                "count": totals.count,
                "calories": totals.calories,
                "foods": totals.foods,
            })
        })
        .collect();
    json!({ "categories": categories })
}

fn confirm_detection(
    request: &HttpRequest,
    tracker: &FoodTracker,
    board: &PendingBoard,
) -> Result<Reply> {
    let body: ConfirmBody = match serde_json::from_slice(&request.body) {
        Ok(body) => body,
        Err(_) => return Ok((400, json!({"success": false, "error": "invalid_json"}))),
    };
    let Some(food) = body.food.filter(|f| !f.trim().is_empty()) else {
        return Ok((
            400,
            json!({"success": false, "error": "No food item specified"}),
        ));
    };
    let logged = tracker.confirm(&food, body.confidence)?;
    if let Some(bbox) = body.bbox {
        board.request_confirmation(IdentityKey::from_pixels(&logged.food, bbox));
    }
    Ok((
        200,
        json!({
            "success": true,
            "food": logged.food,
            "calories": logged.calories,
            "timestamp": logged.timestamp,
        }),
    ))
}

fn delete_detection(id: &str, tracker: &FoodTracker) -> Result<Reply> {
    if tracker.delete(id)? {
        Ok((
            200,
            json!({"success": true, "message": "Food item deleted successfully"}),
        ))
    } else {
        Ok((
            404,
            json!({"success": false, "error": "Failed to delete food item"}),
        ))
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break find_header_end(&data);
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(end) = find_header_end(&data) {
            break Some(end);
        }
    };
    let header_end = header_end.ok_or_else(|| anyhow!("incomplete request headers"))?;

    let text = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    if header_end + 4 + content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }
    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw_path, HashMap::new()),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
        body,
    })
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (percent_decode(k), percent_decode(v)))
        .collect()
}

/// Decode `%XX` escapes; malformed escapes are kept verbatim.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn write_json_response(
    stream: &mut TcpStream,
    status: u16,
    body: &serde_json::Value,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_decoding() {
        assert_eq!(
            percent_decode("2026-05-10T09%3A00%3A00.000250"),
            "2026-05-10T09:00:00.000250"
        );
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn query_parsing() {
        let query = parse_query("limit=5&date=2026-05-10&flag");
        assert_eq!(query.get("limit").map(String::as_str), Some("5"));
        assert_eq!(query.get("date").map(String::as_str), Some("2026-05-10"));
        assert!(!query.contains_key("flag"));
    }
}
