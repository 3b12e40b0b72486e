use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use parasite_peer::HandshakeRecord;
use parasite_transport::PluginEntry;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
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

#[derive(Serialize)]
struct ReplyOutput<'a> {
    plugin: &'a str,
    call: &'a str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_reply(plugin: &str, call: &str, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                plugin,
                call,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["PLUGIN", "CALL", "SIZE", "REPLY"]);
            table.add_row(vec![
                plugin.to_string(),
                call.to_string(),
                payload.len().to_string(),
                payload_preview(payload),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "plugin={plugin} call={call} size={} reply={}",
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

#[derive(Serialize)]
struct PluginOutput {
    name: String,
    path: String,
}

pub fn print_plugins(plugins: &[PluginEntry], format: OutputFormat) {
    let rows: Vec<PluginOutput> = plugins
        .iter()
        .map(|entry| PluginOutput {
            name: entry.name.clone(),
            path: entry.path.display().to_string(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PLUGIN", "PATH"]);
            for row in &rows {
                table.add_row(vec![row.name.clone(), row.path.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!("{}  {}", row.name, row.path);
            }
        }
        OutputFormat::Raw => {
            for row in &rows {
                println!("{}", row.name);
            }
        }
    }
}

#[derive(Serialize)]
struct HandshakeOutput<'a> {
    host_name: &'a str,
    host_version: &'a str,
    blob: &'a str,
}

pub fn print_handshake(record: &HandshakeRecord, blob: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&HandshakeOutput {
            host_name: &record.host_name,
            host_version: &record.host_version,
            blob,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["HOST", "VERSION", "BLOB"]);
            table.add_row(vec![
                record.host_name.clone(),
                record.host_version.clone(),
                blob.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "host={} version={} blob={blob}",
                record.host_name, record.host_version
            );
        }
        OutputFormat::Raw => println!("{blob}"),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
