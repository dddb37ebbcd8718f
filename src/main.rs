#![cfg(feature = "cli")]
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info, warn, Level};

use widevine_proxy::config::ProxyConfig;
use widevine_proxy::proxy::Proxy;
use widevine_proxy::pssh::PsshSummary;
use widevine_proxy::signer;

#[derive(Parser)]
#[command(name = "widevine-proxy", version, disable_version_flag = true, about = "Widevine license proxy")]
struct Cli {
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue)]
    version: bool,

    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the fields and key IDs of a base64 PSSH box.
    Pssh { pssh: String },
    /// Sign a file with the configured key and print the envelope JSON.
    Sign {
        config_path: PathBuf,
        payload_path: PathBuf,
    },
    /// Send a raw license request parse-only and print the response.
    Parse {
        config_path: PathBuf,
        request_path: PathBuf,
    },
    /// Relay a raw certificate or license request.
    ///
    /// Writes the decoded license to `--output`, or prints it as base64.
    License {
        config_path: PathBuf,
        request_path: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    #[cfg(feature = "serve")]
    /// Serve the proxy over HTTP.
    Serve {
        config_path: PathBuf,
        #[arg(long = "host", default_value = "127.0.0.1")]
        host: String,
        #[arg(short = 'p', long = "port", default_value = "8786")]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .init();

    info!("widevine-proxy version {}", env!("CARGO_PKG_VERSION"));

    if cli.version {
        return Ok(());
    }

    match cli.command {
        Some(Commands::Pssh { pssh }) => run_pssh(&pssh),
        Some(Commands::Sign {
            config_path,
            payload_path,
        }) => run_sign(&config_path, &payload_path),
        Some(Commands::Parse {
            config_path,
            request_path,
        }) => run_parse(&config_path, &request_path),
        Some(Commands::License {
            config_path,
            request_path,
            output,
        }) => run_license(&config_path, &request_path, output.as_deref()),
        #[cfg(feature = "serve")]
        Some(Commands::Serve {
            config_path,
            host,
            port,
        }) => run_serve(&config_path, &host, port),
        None => Ok(()),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ProxyConfig> {
    ProxyConfig::from_path(path)
        .with_context(|| format!("Failed to load config {}", path.display()))
}

fn run_pssh(pssh: &str) -> anyhow::Result<()> {
    let summary = PsshSummary::from_base64(pssh).context("Failed to parse PSSH")?;
    info!("size: {} ({})", summary.size_hex, summary.size);
    info!("type: {}", summary.box_type);
    info!("version: {}", summary.version);
    info!("flags: {}", summary.flags);
    match summary.system() {
        Some(system) => info!("system_id: {} ({:?})", summary.system_id, system),
        None => info!("system_id: {}", summary.system_id),
    }
    info!("data ({} bytes): {}", summary.data_size, summary.data_hex);
    if summary.key_ids.is_empty() {
        warn!("No key IDs found");
    }
    for kid in summary.key_id_uuids() {
        info!("kid: {}", kid);
    }
    Ok(())
}

fn run_sign(config_path: &Path, payload_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let payload = std::fs::read(payload_path).context("Failed to read payload")?;
    let envelope = signer::pack(
        &payload,
        &config.signing_key_bytes()?,
        &config.signing_iv_bytes()?,
        &config.provider,
    )
    .context("Failed to sign payload")?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn run_parse(config_path: &Path, request_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let proxy = Proxy::from_config(&config)?;
    let request = std::fs::read(request_path).context("Failed to read request")?;

    let response = proxy
        .parse_license(&request)
        .context("Parse request failed")?;
    info!("[+] Parsed request: status {}", response.status);
    for kid in response.pssh_data.key_id_bytes() {
        info!("kid: {}", hex::encode(kid));
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_license(config_path: &Path, request_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let proxy = Proxy::from_config(&config)?;
    let request = std::fs::read(request_path).context("Failed to read request")?;

    if proxy.is_certificate_request(&request) {
        info!("[+] Relaying service certificate request ({} bytes)", request.len());
    } else {
        info!("[+] Relaying license request ({} bytes)", request.len());
    }

    let response = match proxy.get_license(&request) {
        Ok(response) => response,
        Err(e) => {
            if let Some(status) = e.rejected_status() {
                error!("[-] License service rejected the request: {}", status);
            }
            return Err(e).context("License request failed");
        }
    };
    let license = response.license_bytes().context("Failed to decode license")?;
    info!("[+] Got License Message ({} bytes)", license.len());

    match output {
        Some(path) => {
            std::fs::write(path, &license)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("[+] Wrote {}", path.display());
        }
        None => println!("{}", base64::engine::general_purpose::STANDARD.encode(&license)),
    }
    Ok(())
}

#[cfg(feature = "serve")]
fn run_serve(config_path: &Path, host: &str, port: u16) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;
    runtime.block_on(widevine_proxy::serve::run(config, host, port))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn license_command_parses_output_flag() {
        let cli = Cli::try_parse_from([
            "widevine-proxy",
            "license",
            "config.yaml",
            "request.bin",
            "-o",
            "license.bin",
        ])
        .expect("parse");
        match cli.command {
            Some(Commands::License { output, .. }) => {
                assert_eq!(output.unwrap().to_str(), Some("license.bin"))
            }
            _ => panic!("expected license command"),
        }
    }

    #[cfg(feature = "serve")]
    #[test]
    fn serve_accepts_long_host_and_short_port() {
        let cli = Cli::try_parse_from([
            "widevine-proxy",
            "serve",
            "config.yaml",
            "--host",
            "0.0.0.0",
            "-p",
            "9000",
        ])
        .expect("parse");
        match cli.command {
            Some(Commands::Serve { host, port, .. }) => {
                assert_eq!(host, "0.0.0.0");
                assert_eq!(port, 9000);
            }
            _ => panic!("expected serve command"),
        }
    }
}
