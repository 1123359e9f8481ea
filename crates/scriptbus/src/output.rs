use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scriptbus_frame::flag::flag_name;
use serde::Serialize;
use serde_json::Value;

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

/// One wire frame as reported by the CLI.
#[derive(Debug, Serialize)]
pub struct FrameRow {
    pub event_id: String,
    pub kind: &'static str,
    pub size: usize,
    pub body: String,
}

impl FrameRow {
    pub fn new(event_id: impl Into<String>, body: impl Into<String>) -> Self {
        let event_id = event_id.into();
        let body = body.into();
        let kind = body.chars().next().map(flag_name).unwrap_or("EMPTY");
        Self {
            size: event_id.len() + body.len(),
            event_id,
            kind,
            body,
        }
    }
}

pub fn print_frames(frames: &[FrameRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(frames),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "EVENT", "KIND", "SIZE", "BODY"]);
            for (index, frame) in frames.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    frame.event_id.clone(),
                    frame.kind.to_string(),
                    frame.size.to_string(),
                    frame.body.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!(
                    "event={} kind={} size={} body={}",
                    frame.event_id, frame.kind, frame.size, frame.body
                );
            }
        }
        OutputFormat::Raw => {
            for frame in frames {
                print_raw(&frame.body);
            }
        }
    }
}

/// Print labelled fields, such as a decoded frame.
pub fn print_fields(fields: &[(&str, Value)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let object: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect();
            print_json(&object);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in fields {
                table.add_row(vec![key.to_string(), display_value(value)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = fields
                .iter()
                .map(|(key, value)| format!("{key}={}", display_value(value)))
                .collect();
            println!("{}", line.join(" "));
        }
        OutputFormat::Raw => {
            for (_, value) in fields {
                print_raw(&display_value(value));
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_raw(line: &str) {
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

/// Strings print bare, everything else as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
