use std::fs;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use framelink_engine::{Engine, EngineConfig};
use framelink_frame::{hex, sink_fn, Message};
use tracing::info;

use crate::cmd::EncodeArgs;
use crate::exit::{engine_error, hex_error, io_error, CliResult, SUCCESS};
use crate::output::{print_encoded, Encoded, OutputFormat};

pub fn run(args: EncodeArgs, config: EngineConfig, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let payload_len = payload.len();

    let wire = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&wire);
    let sink = sink_fn(move |bytes: &[u8]| -> io::Result<()> {
        captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
        Ok(())
    });
    let engine =
        Engine::new(config, sink).map_err(|err| engine_error("invalid configuration", err))?;

    let msg = match args.id {
        Some(frame_id) => Message::response(frame_id, args.msg_type, payload),
        None => Message::new(args.msg_type, payload),
    };
    let frame_id = engine
        .send(msg)
        .map_err(|err| engine_error("encode failed", err))?;

    let wire = std::mem::take(&mut *wire.lock().unwrap_or_else(PoisonError::into_inner));
    info!(frame_id, msg_type = args.msg_type, bytes = wire.len(), "frame encoded");

    print_encoded(
        &Encoded {
            frame_id,
            msg_type: args.msg_type,
            payload_len,
            wire: &wire,
        },
        format,
    );
    Ok(SUCCESS)
}

fn resolve_payload(args: &EncodeArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(text) = &args.hex {
        return hex::decode(text).map_err(|err| hex_error("--hex is not valid hex", err));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
