/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_API_PORT: u16 = 3000;
const DEFAULT_DATA_DIR: &str = ".wachat";
const DEFAULT_PAYLOAD_DIR: &str = "Data";
const DEFAULT_BUSINESS_NUMBER: &str = "918329446654";

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the JSON API listens on
    pub api_addr: SocketAddr,

    /// Directory holding the sled database
    pub data_dir: PathBuf,

    /// Directory scanned for webhook payload files
    pub payload_dir: PathBuf,

    /// The business's own number, used as `from` on composed messages
    pub business_number: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            payload_dir: PathBuf::from(DEFAULT_PAYLOAD_DIR),
            business_number: DEFAULT_BUSINESS_NUMBER.to_string(),
        }
    }
}

impl Config {
    /// Create config from command line arguments (`args[0]` is the program name),
    /// then apply `WACHAT_*` environment overrides
    pub fn from_args(args: &[String]) -> Result<Self> {
        Self::parse_args(args)?.with_env_overrides()
    }

    /// Command line flags only, no environment
    pub fn parse_args(args: &[String]) -> Result<Self> {
        let mut api_port: Option<u16> = None;
        let mut data_dir: Option<PathBuf> = None;
        let mut payload_dir: Option<PathBuf> = None;
        let mut business_number: Option<String> = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--port" => {
                    let p = flag_value(args, i, "--port", "a port")?;
                    api_port = Some(parse_port(p, "--port")?);
                    i += 2;
                }
                "--data-dir" => {
                    data_dir = Some(PathBuf::from(flag_value(args, i, "--data-dir", "a path")?));
                    i += 2;
                }
                "--payload-dir" => {
                    payload_dir =
                        Some(PathBuf::from(flag_value(args, i, "--payload-dir", "a path")?));
                    i += 2;
                }
                "--business-number" => {
                    business_number =
                        Some(flag_value(args, i, "--business-number", "a number")?.to_string());
                    i += 2;
                }
                other => {
                    return Err(ChatError::Config(format!(
                        "Unknown argument '{}'. Usage: {} [--port <port>] [--data-dir <path>] [--payload-dir <path>] [--business-number <number>]",
                        other,
                        args.first().map(String::as_str).unwrap_or("wachat")
                    )));
                }
            }
        }

        let defaults = Self::default();
        Ok(Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], api_port.unwrap_or(DEFAULT_API_PORT))),
            data_dir: data_dir.unwrap_or(defaults.data_dir),
            payload_dir: payload_dir.unwrap_or(defaults.payload_dir),
            business_number: business_number.unwrap_or(defaults.business_number),
        })
    }

    /// Env overrides (nice for scripts)
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(p) = std::env::var("WACHAT_API_PORT") {
            let port = parse_port(&p, "WACHAT_API_PORT")?;
            self.api_addr.set_port(port);
        }
        if let Ok(d) = std::env::var("WACHAT_DATA_DIR") {
            self.data_dir = PathBuf::from(d);
        }
        if let Ok(d) = std::env::var("WACHAT_PAYLOAD_DIR") {
            self.payload_dir = PathBuf::from(d);
        }
        if let Ok(n) = std::env::var("WACHAT_BUSINESS_NUMBER") {
            self.business_number = n;
        }
        Ok(self)
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str, what: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ChatError::Config(format!("{} requires {} argument", flag, what)))
}

fn parse_port(raw: &str, source: &str) -> Result<u16> {
    raw.parse::<u16>().map_err(|_| {
        ChatError::Config(format!("{} must be a valid number (0-65535)", source))
    })
}
