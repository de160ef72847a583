use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_engine::EngineConfig;

use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

pub fn run(config: EngineConfig, format: OutputFormat) -> CliResult<i32> {
    match format {
        OutputFormat::Table => {
            let frame = &config.frame;
            let sof = frame
                .sof_byte
                .map_or_else(|| "none".to_string(), |b| format!("{b:#04x}"));
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SETTING", "VALUE"]);
            for (name, value) in [
                ("id_bytes", frame.id_bytes.to_string()),
                ("len_bytes", frame.len_bytes.to_string()),
                ("type_bytes", frame.type_bytes.to_string()),
                ("checksum", format!("{:?}", frame.checksum).to_lowercase()),
                ("sof_byte", sof),
                ("header_len", frame.header_len().to_string()),
                ("max_payload_rx", frame.max_payload_rx.to_string()),
                ("send_buf_len", frame.send_buf_len.to_string()),
                ("parser_timeout_ticks", frame.parser_timeout_ticks.to_string()),
                ("peer", format!("{:?}", frame.peer).to_lowercase()),
                ("max_id_listeners", config.max_id_listeners.to_string()),
                ("max_type_listeners", config.max_type_listeners.to_string()),
                ("max_generic_listeners", config.max_generic_listeners.to_string()),
                ("claim", format!("{:?}", config.claim).to_lowercase()),
            ] {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let json = serde_json::to_string_pretty(&config)
                .map_err(|err| CliError::new(INTERNAL, format!("serialize config: {err}")))?;
            println!("{json}");
        }
        OutputFormat::Json | OutputFormat::Raw => {
            let json = serde_json::to_string(&config)
                .map_err(|err| CliError::new(INTERNAL, format!("serialize config: {err}")))?;
            println!("{json}");
        }
    }
    Ok(SUCCESS)
}
