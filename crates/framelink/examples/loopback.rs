//! Two engines wired back to back through in-memory channels.
//!
//! The slave answers every `PING` with the payload reversed. The master
//! sends three queries, one of which is addressed to a type nobody serves
//! and times out.
//!
//! Run with:
//!   cargo run --example loopback

use std::sync::mpsc::{self, Receiver};

use framelink::frame::{hex, sink_fn, Checksum, FrameConfig, Message, Peer};
use framelink::{Directive, Engine, EngineConfig};

const PING: u32 = 0x22;
const UNSERVED: u32 = 0x23;

fn endpoint(peer: Peer) -> Result<(Engine, Receiver<Vec<u8>>), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    let sink = sink_fn(move |bytes: &[u8]| {
        tx.send(bytes.to_vec())
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    });
    let config = EngineConfig {
        frame: FrameConfig {
            checksum: Checksum::Crc16,
            peer,
            ..FrameConfig::default()
        },
        ..EngineConfig::default()
    };
    Ok((Engine::new(config, sink)?, rx))
}

/// Move every pending byte across the link in both directions.
fn pump(a: &Engine, a_out: &Receiver<Vec<u8>>, b: &Engine, b_out: &Receiver<Vec<u8>>) -> bool {
    let mut moved = false;
    while let Ok(bytes) = a_out.try_recv() {
        eprintln!("master -> {}", hex::encode(&bytes, " "));
        b.accept(&bytes);
        moved = true;
    }
    while let Ok(bytes) = b_out.try_recv() {
        eprintln!("slave  -> {}", hex::encode(&bytes, " "));
        a.accept(&bytes);
        moved = true;
    }
    moved
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (master, master_out) = endpoint(Peer::Master)?;
    let (slave, slave_out) = endpoint(Peer::Slave)?;

    slave.add_type_listener(PING, |engine, msg| {
        let mut body = msg.payload.to_vec();
        body.reverse();
        if let Err(err) = engine.respond(msg.reply(body)) {
            eprintln!("slave failed to respond: {err}");
        }
        Directive::Stay
    })?;

    for word in ["hello", "framelink"] {
        master.query_simple(PING, word.as_bytes().to_vec(), move |_, reply| {
            println!(
                "{word:?} answered by frame {:#04x}: {}",
                reply.frame_id,
                hex::preview(&reply.payload)
            );
            Directive::Close
        })?;
    }

    master.query_with_timeout(
        Message::new(UNSERVED, b"anyone?".to_vec()),
        |_, _| Directive::Close,
        3,
        |_| println!("query on type {UNSERVED:#04x} timed out"),
    )?;

    while pump(&master, &master_out, &slave, &slave_out) {}
    for _ in 0..5 {
        master.tick();
        slave.tick();
    }

    Ok(())
}
