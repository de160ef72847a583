use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand, ValueEnum};
use framelink_engine::EngineConfig;
use framelink_frame::{Checksum, Peer};
use tracing::debug;

use crate::exit::{engine_error, io_error, CliResult};
use crate::output::OutputFormat;

pub mod config;
pub mod decode;
pub mod encode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode one message into a frame and print its bytes.
    Encode(EncodeArgs),
    /// Decode frames from a byte stream.
    Decode(DecodeArgs),
    /// Print the effective link configuration.
    Config(ConfigArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, config: Option<&Path>, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => {
            let config = load_config(config, &args.link)?;
            encode::run(args, config, format)
        }
        Command::Decode(args) => {
            let config = load_config(config, &args.link)?;
            decode::run(args, config, format)
        }
        Command::Config(args) => config::run(load_config(config, &args.link)?, format),
        Command::Version(args) => version::run(args),
    }
}

/// Read the JSON configuration (or defaults) and apply command-line overrides.
pub fn load_config(path: Option<&Path>, link: &LinkArgs) -> CliResult<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|err| {
                io_error(&format!("failed reading {}", path.display()), err)
            })?;
            EngineConfig::from_json(&json)
                .map_err(|err| engine_error(&format!("invalid config {}", path.display()), err))?
        }
        None => EngineConfig::default(),
    };

    if let Some(checksum) = link.checksum {
        config.frame.checksum = checksum.into();
    }
    if let Some(peer) = link.peer {
        config.frame.peer = peer.into();
    }
    if link.no_sof {
        config.frame.sof_byte = None;
    }

    config
        .validate()
        .map_err(|err| engine_error("invalid configuration", err))?;
    debug!(?config, "link configuration loaded");
    Ok(config)
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ChecksumArg {
    None,
    Xor,
    Crc8,
    Crc16,
    Crc32,
}

impl From<ChecksumArg> for Checksum {
    fn from(arg: ChecksumArg) -> Self {
        match arg {
            ChecksumArg::None => Checksum::None,
            ChecksumArg::Xor => Checksum::Xor,
            ChecksumArg::Crc8 => Checksum::Crc8,
            ChecksumArg::Crc16 => Checksum::Crc16,
            ChecksumArg::Crc32 => Checksum::Crc32,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PeerArg {
    Master,
    Slave,
}

impl From<PeerArg> for Peer {
    fn from(arg: PeerArg) -> Self {
        match arg {
            PeerArg::Master => Peer::Master,
            PeerArg::Slave => Peer::Slave,
        }
    }
}

/// Overrides applied on top of the configuration file.
#[derive(Args, Debug, Default)]
pub struct LinkArgs {
    /// Checksum algorithm.
    #[arg(long, value_name = "ALGO")]
    pub checksum: Option<ChecksumArg>,
    /// Peer role, selects the top bit of allocated frame IDs.
    #[arg(long)]
    pub peer: Option<PeerArg>,
    /// Frames carry no start-of-frame byte.
    #[arg(long)]
    pub no_sof: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Message type.
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub msg_type: u32,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload (e.g. "01 02 ff").
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Reuse this frame ID (a response) instead of allocating one.
    #[arg(long)]
    pub id: Option<u32>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex encoded input.
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read raw bytes from file. Defaults to stdin.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
    /// Stop after N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
