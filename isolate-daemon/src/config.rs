//! CLI surface (spec.md §6): `--socket`, `--host`, `--port`,
//! `--max-isolates`, `--memory-limit`, `--help`. Socket and host/port are
//! mutually exclusive; an unknown flag must exit with code 1.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

const DEFAULT_SOCKET_PATH: &str = "/tmp/isolate-daemon.sock";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 47891;
const DEFAULT_MAX_ISOLATES: usize = 64;
const DEFAULT_MEMORY_LIMIT_MB: u64 = 64;

#[derive(Debug, Parser)]
#[command(name = "isolate-daemon", about = "Sandboxed-execution daemon hosting V8 isolates as guest tenants")]
struct Cli {
    /// Unix domain socket path. Mutually exclusive with --host/--port.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// TCP listen host. Mutually exclusive with --socket.
    #[arg(long)]
    host: Option<String>,

    /// TCP listen port. Mutually exclusive with --socket.
    #[arg(long)]
    port: Option<u16>,

    #[arg(long, default_value_t = DEFAULT_MAX_ISOLATES)]
    max_isolates: usize,

    /// Per-isolate memory limit, in megabytes.
    #[arg(long, default_value_t = DEFAULT_MEMORY_LIMIT_MB)]
    memory_limit: u64,
}

/// The local IPC endpoint a daemon instance listens on (spec.md §6). Exactly
/// one of Unix or Tcp per instance.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub max_isolates: usize,
    pub memory_limit_bytes: u64,
}

impl Config {
    /// Parses `std::env::args()`. On `--help` or a usage error, prints the
    /// message and exits the process (code 0 for help, 1 for an unknown or
    /// malformed flag, matching spec.md §6).
    #[must_use]
    pub fn parse_from_args() -> Self {
        let cli = match Cli::try_parse() {
            Ok(cli) => cli,
            Err(err) => {
                let code = if err.kind() == clap::error::ErrorKind::DisplayHelp
                    || err.kind() == clap::error::ErrorKind::DisplayVersion
                {
                    0
                } else {
                    1
                };
                err.print().ok();
                std::process::exit(code);
            }
        };
        Self::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> Self {
        if cli.socket.is_some() && (cli.host.is_some() || cli.port.is_some()) {
            eprintln!("error: --socket is mutually exclusive with --host/--port");
            std::process::exit(1);
        }

        let endpoint = match cli.socket {
            Some(path) => Endpoint::Unix(path),
            None => {
                let host = cli.host.unwrap_or_else(|| DEFAULT_HOST.to_owned());
                let port = cli.port.unwrap_or(DEFAULT_PORT);
                match host.parse::<IpAddr>() {
                    Ok(ip) => Endpoint::Tcp(SocketAddr::new(ip, port)),
                    Err(_) => {
                        eprintln!("error: --host must be an IP address, got '{host}'");
                        std::process::exit(1);
                    }
                }
            }
        };

        Self {
            endpoint,
            max_isolates: cli.max_isolates,
            memory_limit_bytes: cli.memory_limit * 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET_PATH)),
            max_isolates: DEFAULT_MAX_ISOLATES,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_MB * 1024 * 1024,
        }
    }
}
