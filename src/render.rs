//! ==============================================================================
//! render.rs - html for the console dashboard
//! ==============================================================================
//!
//! purpose:
//!     turns RowView / ConsoleLine projections into markup. the page is fully
//!     repainted from the ledger on every request; nothing here holds state.
//!
//! ==============================================================================

use crate::console::{ConsoleLine, StatusLevel};
use crate::domain::RowView;

/// time | topic | device | id | data | since prev | same device
const COLUMNS: usize = 7;

pub fn render_rows(rows: &[RowView]) -> String {
    if rows.is_empty() {
        return format!(
            r#"<tr class="empty-row"><td colspan="{}">No messages yet. Enable debug mode to see MQTT traffic here.</td></tr>"#,
            COLUMNS
        );
    }

    let mut html = String::new();
    for row in rows {
        match row {
            RowView::Data { time, topic, device, device_id, fields, delta, same_device_delta } => {
                let data = fields
                    .iter()
                    .map(|f| format!("<span class=\"field\">{}: <b>{}</b></span>", html_escape(&f.name), html_escape(&f.value)))
                    .collect::<Vec<_>>()
                    .join(" ");
                html.push_str(&format!(
                    "<tr><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    html_escape(time),
                    html_escape(topic),
                    html_escape(device),
                    html_escape(device_id),
                    data,
                    html_escape(delta),
                    html_escape(same_device_delta),
                ));
            }
            RowView::Separator { message, .. } => {
                html.push_str(&format!(
                    "<tr class=\"separator-row\"><td colspan=\"{}\">{}</td></tr>\n",
                    COLUMNS,
                    html_escape(message)
                ));
            }
        }
    }
    html
}

pub fn render_console(lines: &[ConsoleLine]) -> String {
    lines
        .iter()
        .map(|line| {
            format!(
                "<div class=\"console-line {}\">{}</div>",
                level_class(line.level),
                html_escape(&line.render())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn level_class(level: StatusLevel) -> &'static str {
    match level {
        StatusLevel::Info => "info",
        StatusLevel::Success => "success",
        StatusLevel::Error => "error",
    }
}

pub fn render_page(rows: &[RowView], lines: &[ConsoleLine], debug_enabled: bool) -> String {
    let (state, color) = if debug_enabled { ("ON", "#10b981") } else { ("OFF", "#ef4444") };
    format!(
        r#"<!doctype html>
<html>
<head>
<title>gateway debug console</title>
<meta http-equiv="refresh" content="2">
<style>
    body {{ font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee; }}
    table {{ width: 100%; border-collapse: collapse; }}
    td, th {{ padding: 0.3rem 0.6rem; border-bottom: 1px solid #16213e; text-align: left; }}
    .separator-row td {{ text-align: center; color: #888; font-style: italic; }}
    .console {{ background: #16213e; padding: 1rem; border-radius: 8px; font-family: monospace; }}
    .console-line.error {{ color: #ff6b6b; }}
    .console-line.success {{ color: #10b981; }}
</style>
</head>
<body>
    <h1>Debug Console <span style="color: {color};">{state}</span> <small>({count} rows)</small></h1>
    <table>
        <thead><tr><th>Time</th><th>Topic</th><th>Device</th><th>ID</th><th>Data</th><th>Since Prev</th><th>Same Device</th></tr></thead>
        <tbody>
{rows}
        </tbody>
    </table>
    <h2>Console</h2>
    <div class="console">
{console}
    </div>
</body>
</html>"#,
        color = color,
        state = state,
        count = rows.len(),
        rows = render_rows(rows),
        console = render_console(lines),
    )
}

/// escape html special characters to prevent xss
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
