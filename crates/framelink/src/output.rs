use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_frame::{hex, Event, Message};
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

/// One frame produced by `encode`.
pub struct Encoded<'a> {
    pub frame_id: u32,
    pub msg_type: u32,
    pub payload_len: usize,
    pub wire: &'a [u8],
}

#[derive(Serialize)]
struct EncodedOutput {
    frame_id: u32,
    msg_type: u32,
    payload_size: usize,
    wire_size: usize,
    wire: String,
}

#[derive(Serialize)]
struct MessageOutput {
    frame_id: u32,
    msg_type: u32,
    payload_size: usize,
    payload: String,
}

#[derive(Serialize)]
struct EventOutput {
    event: &'static str,
    error: bool,
    detail: String,
}

#[derive(Serialize)]
struct DecodeSummary {
    messages: usize,
    events: Vec<EventOutput>,
    trailing_bytes: bool,
}

pub fn print_encoded(frame: &Encoded<'_>, format: OutputFormat) {
    let wire = hex::encode(frame.wire, " ");
    match format {
        OutputFormat::Json => {
            let out = EncodedOutput {
                frame_id: frame.frame_id,
                msg_type: frame.msg_type,
                payload_size: frame.payload_len,
                wire_size: frame.wire.len(),
                wire,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "TYPE", "SIZE", "WIRE"])
                .add_row(vec![
                    format!("{:#04x}", frame.frame_id),
                    format!("{:#04x}", frame.msg_type),
                    frame.payload_len.to_string(),
                    wire,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{wire}"),
        OutputFormat::Raw => print_raw(frame.wire),
    }
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                frame_id: msg.frame_id,
                msg_type: msg.msg_type,
                payload_size: msg.len(),
                payload: hex::encode(&msg.payload, ""),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "id={:#04x} type={:#04x} size={} payload={}",
                msg.frame_id,
                msg.msg_type,
                msg.len(),
                hex::preview(&msg.payload)
            );
        }
        OutputFormat::Raw => print_raw(&msg.payload),
        // Table output is collected and printed once by `print_message_table`.
        OutputFormat::Table => {}
    }
}

pub fn print_message_table(messages: &[Message]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "TYPE", "SIZE", "PAYLOAD"]);
    for msg in messages {
        table.add_row(vec![
            format!("{:#04x}", msg.frame_id),
            format!("{:#04x}", msg.msg_type),
            msg.len().to_string(),
            hex::preview(&msg.payload),
        ]);
    }
    println!("{table}");
}

/// Report parser events after a decode. Raw output keeps stdout clean.
pub fn print_summary(messages: usize, events: &[Event], trailing_bytes: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DecodeSummary {
                messages,
                events: events
                    .iter()
                    .map(|event| EventOutput {
                        event: event_name(event),
                        error: event.is_error(),
                        detail: event.to_string(),
                    })
                    .collect(),
                trailing_bytes,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            if events.is_empty() {
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "DETAIL"]);
            for event in events {
                table.add_row(vec![event_name(event).to_string(), event.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for event in events {
                println!("event={} {}", event_name(event), event);
            }
            if trailing_bytes {
                println!("incomplete frame at end of input");
            }
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn event_name(event: &Event) -> &'static str {
    match event {
        Event::HeadChecksumMismatch { .. } => "head_checksum_mismatch",
        Event::BodyChecksumMismatch { .. } => "body_checksum_mismatch",
        Event::PayloadTooLong { .. } => "payload_too_long",
        Event::ParserTimeout { .. } => "parser_timeout",
        Event::Unhandled { .. } => "unhandled",
        Event::ListenerExpired { .. } => "listener_expired",
        Event::ListenerTableFull { .. } => "listener_table_full",
        Event::ClaimUnavailable => "claim_unavailable",
        Event::WriteFailed { .. } => "write_failed",
    }
}
