use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Where a printed message came from.
#[derive(Debug, Clone, Copy)]
pub struct MessageSource<'a> {
    pub path: &'a str,
    pub peer_pid: Option<u32>,
    pub sequence: usize,
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    path: &'a str,
    sequence: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer_pid: Option<u32>,
    payload_size: usize,
    encoding: &'static str,
    payload: String,
    timestamp: String,
}

pub fn print_message(payload: &[u8], source: MessageSource<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", render_json(payload, source, now_unix_seconds()));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    source.sequence.to_string(),
                    payload.len().to_string(),
                    peer_label(source.peer_pid),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{} size={} peer={} payload={}",
                source.sequence,
                payload.len(),
                peer_label(source.peer_pid),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn render_json(payload: &[u8], source: MessageSource<'_>, timestamp: String) -> String {
    let (encoding, payload_text) = match std::str::from_utf8(payload) {
        Ok(text) => ("utf8", text.to_string()),
        Err(_) => ("hex", hex(payload)),
    };
    let out = MessageOutput {
        path: source.path,
        sequence: source.sequence,
        peer_pid: source.peer_pid,
        payload_size: payload.len(),
        encoding,
        payload: payload_text,
        timestamp,
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

fn peer_label(pid: Option<u32>) -> String {
    pid.map(|pid| format!("pid:{pid}"))
        .unwrap_or_else(|| "-".to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
