//! Frames over an in-memory async pipe using the tokio codec.
//!
//! Run with:
//!   cargo run --example async-loopback --features async

use std::sync::Arc;

use framelink::frame::{hex, Checksum, FrameCodec, FrameConfig, Message, Peer, TracingSink};
use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::Framed;

const ECHO: u32 = 0x10;

fn codec(peer: Peer) -> Result<FrameCodec, Box<dyn std::error::Error>> {
    let config = FrameConfig {
        checksum: Checksum::Crc32,
        len_bytes: 2,
        peer,
        ..FrameConfig::default()
    };
    Ok(FrameCodec::new(config, Arc::new(TracingSink))?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (client_io, server_io) = tokio::io::duplex(64);
    let mut client = Framed::new(client_io, codec(Peer::Master)?);
    let mut server = Framed::new(server_io, codec(Peer::Slave)?);

    let server_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = server.next().await {
            eprintln!(
                "server got id={:#04x} {}",
                msg.frame_id,
                hex::preview(&msg.payload)
            );
            let mut body = msg.payload.to_vec();
            body.make_ascii_uppercase();
            if server.send(msg.reply(body)).await.is_err() {
                break;
            }
        }
    });

    for word in ["alpha", "beta", "gamma"] {
        client.send(Message::new(ECHO, word.as_bytes().to_vec())).await?;
        if let Some(reply) = client.next().await {
            let reply = reply?;
            println!(
                "{word} -> {} (frame {:#04x})",
                hex::preview(&reply.payload),
                reply.frame_id
            );
        }
    }

    drop(client);
    server_task.await?;
    Ok(())
}
