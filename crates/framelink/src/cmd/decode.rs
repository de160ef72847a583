use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

use framelink_engine::EngineConfig;
use framelink_frame::{hex, EventQueue, FrameError, FrameReader, ParserState};
use tracing::{debug, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, hex_error, io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_message, print_message_table, print_summary, OutputFormat};

const EVENT_CAPACITY: usize = 256;

pub fn run(args: DecodeArgs, config: EngineConfig, format: OutputFormat) -> CliResult<i32> {
    let input = resolve_input(&args)?;
    let events = Arc::new(EventQueue::new(EVENT_CAPACITY));
    let mut reader = FrameReader::new(input.as_slice(), config.frame, events.clone())
        .map_err(|err| frame_error("invalid configuration", err))?;

    let mut messages = Vec::new();
    while args.count.is_none_or(|limit| messages.len() < limit) {
        match reader.read_message() {
            Ok(msg) => {
                debug!(frame_id = msg.frame_id, msg_type = msg.msg_type, "frame decoded");
                print_message(&msg, format);
                messages.push(msg);
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("decode failed", err)),
        }
    }

    if matches!(format, OutputFormat::Table) {
        print_message_table(&messages);
    }

    let trailing = reader.parser().state() != ParserState::StartOfFrame;
    let events = events.drain();
    if trailing {
        warn!(state = ?reader.parser().state(), "input ends inside a frame");
    }
    print_summary(messages.len(), &events, trailing, format);

    if events.iter().any(|event| event.is_error()) {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

fn resolve_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(text) = &args.hex {
        return hex::decode(text).map_err(|err| hex_error("--hex is not valid hex", err));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let mut input = Vec::new();
    io::stdin()
        .read_to_end(&mut input)
        .map_err(|err| io_error("failed reading stdin", err))?;
    Ok(input)
}
