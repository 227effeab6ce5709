use axum::{
    extract::State,
    response::{Html, Json},
    routing::get,
    Router,
};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::bot::{GuardBot, GuardStatus};

/// Shared state handed to every route
#[derive(Clone)]
pub struct DashboardState {
    pub bot: Arc<GuardBot>,
}

/// Process memory as reported by the kernel
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

/// Reads `/proc/self/status`; `None` where procfs is unavailable
pub fn memory_usage() -> Option<MemoryUsage> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_proc_status(&status)
}

/// `VmRSS` and `VmSize` are reported in kB whatever the kernel page size
fn parse_proc_status(status: &str) -> Option<MemoryUsage> {
    let field_bytes = |key: &str| -> Option<u64> {
        let line = status.lines().find(|line| line.starts_with(key))?;
        let mut parts = line[key.len()..].split_whitespace();
        let value = parts.next()?.parse::<u64>().ok()?;
        match parts.next() {
            Some("kB") => Some(value * 1024),
            _ => None,
        }
    };

    Some(MemoryUsage {
        resident_bytes: field_bytes("VmRSS:")?,
        virtual_bytes: field_bytes("VmSize:")?,
    })
}

fn format_uptime(seconds: u64) -> String {
    format!("{}h {}m {}s", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ENABLED"
    } else {
        "DISABLED"
    }
}

pub struct WebDashboard {
    state: DashboardState,
}

impl WebDashboard {
    pub fn new(bot: Arc<GuardBot>) -> Self {
        Self {
            state: DashboardState { bot },
        }
    }

    pub async fn start_server(&self, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_routes();

        info!("Binding to 0.0.0.0:{}...", port);
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Web server running on port {}", port);
        info!("Health check: http://localhost:{}/health", port);

        axum::serve(listener, app).await?;
        Ok(())
    }

    pub fn create_routes(&self) -> Router {
        Router::new()
            .route("/", get(dashboard_html))
            .route("/health", get(get_health))
            .route("/stats", get(get_stats))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }
}

async fn get_health(State(state): State<DashboardState>) -> Json<serde_json::Value> {
    let status = state.bot.status().await;
    Json(serde_json::json!({
        "status": "online",
        "uptime": status.uptime_seconds,
        "memoryUsage": memory_usage(),
        "connectedGuilds": status.connected_guilds,
        "features": {
            "dynamicScan": status.dynamic_scan,
            "autoGuard": status.auto_guard,
            "profanityFilter": status.profanity_filter
        },
        "timestamp": chrono::Utc::now()
    }))
}

async fn get_stats(State(state): State<DashboardState>) -> Json<serde_json::Value> {
    let status = state.bot.status().await;
    Json(serde_json::json!({
        "bot": {
            "id": status.bot_user_id.clone().unwrap_or_else(|| "Not Ready".to_string()),
            "platform": status.platform,
            "guilds": status.connected_guilds,
            "uptime": status.uptime_seconds
        },
        "system": {
            "memory": memory_usage(),
            "os": std::env::consts::OS,
            "version": env!("CARGO_PKG_VERSION")
        },
        "config": {
            "autoGuard": status.auto_guard,
            "dynamicScan": status.dynamic_scan,
            "scanInterval": status.scan_interval_ms,
            "profanityFilter": status.profanity_filter
        }
    }))
}

async fn dashboard_html(State(state): State<DashboardState>) -> Html<String> {
    Html(render_dashboard(&state.bot.status().await, memory_usage()))
}

fn render_dashboard(status: &GuardStatus, memory: Option<MemoryUsage>) -> String {
    let memory = memory
        .map(|m| format!("{} MB", m.resident_bytes / 1024 / 1024))
        .unwrap_or_else(|| "unavailable".to_string());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Voice Guard</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; background: #2c2f33; color: #ffffff; }}
        .container {{ max-width: 600px; margin: 0 auto; }}
        .status {{ background: #43b581; padding: 20px; border-radius: 8px; margin: 20px 0; }}
        .info {{ background: #7289da; padding: 15px; border-radius: 8px; margin: 10px 0; }}
        .feature {{ background: #faa61a; padding: 10px; border-radius: 5px; margin: 5px 0; color: #2c2f33; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>🤖 Voice Guard Dashboard</h1>
        <div class="status">
            <h2>✅ Status: ONLINE</h2>
            <p><strong>Uptime:</strong> {uptime}</p>
            <p><strong>Connected Servers:</strong> {guilds}</p>
            <p><strong>Last Updated:</strong> {updated}</p>
        </div>
        <div class="info">
            <h3>🛡️ Active Features</h3>
            <div class="feature">🔍 Dynamic Channel Scanning: {scan}</div>
            <div class="feature">🛡️ Auto-Guard Mode: {guard}</div>
            <div class="feature">🔍 Profanity Filter: {filter}</div>
            <div class="feature">⏱️ Scan Interval: {interval} seconds</div>
        </div>
        <div class="info">
            <h3>📊 System Info</h3>
            <p><strong>Memory Usage:</strong> {memory}</p>
            <p><strong>Version:</strong> {version}</p>
            <p><strong>Platform:</strong> {os}</p>
        </div>
    </div>
</body>
</html>"#,
        uptime = format_uptime(status.uptime_seconds),
        guilds = status.connected_guilds,
        updated = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        scan = on_off(status.dynamic_scan),
        guard = on_off(status.auto_guard),
        filter = on_off(status.profanity_filter),
        interval = status.scan_interval_ms as f64 / 1000.0,
        memory = memory,
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
    )
}
