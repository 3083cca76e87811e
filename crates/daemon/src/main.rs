/// onionctl - operator tool for the onion transport
///
/// This binary:
/// - Checks whether a multiaddr is a valid onion address and which transport
///   mode would dial it
/// - Resolves host names through the anonymizing client's SOCKS port
/// - Loads or writes the transport configuration file

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};

use oniontransport_common::{
    defaults, Multiaddr, MultiaddrExt, OnionError, PeerId, TransportConfig,
};
use oniontransport_core::{
    is_valid_onion_multiaddr, is_valid_onion_str, parse_onion_multiaddr, Backend, Context,
    OnionBackend, OnionTransport, Resolver, SecuredConn, SocksClient, Transport, TransportConn,
    Upgrader,
};

/// `-v` is the version shorthand, so verbose output has no short form
const VERBOSE_FLAGS: &[&str] = &["--verbose"];

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut args, VERBOSE_FLAGS);

    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = args.first().cloned() else {
        print_help();
        return Ok(());
    };
    let rest = args.split_off(1);

    match command.as_str() {
        "help" | "--help" | "-h" => print_help(),
        "version" | "--version" | "-v" => {
            println!("onionctl v{}", env!("CARGO_PKG_VERSION"));
        }
        "check" => run_check(rest)?,
        "resolve" => run_resolve(rest).await?,
        "config" => run_config(rest)?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run with 'help' to see available commands");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Validate a multiaddr and report which transport modes can dial it
fn run_check(mut args: Vec<String>) -> Result<()> {
    let config = load_config(&mut args)?;
    let onion_only = take_flag(&mut args, &["--onion-only"]) || config.dial_only_onion;
    let [raw] = args.as_slice() else {
        bail!("usage: onionctl check <multiaddr> [--onion-only] [--config PATH]");
    };

    let addr: Multiaddr = raw
        .parse()
        .with_context(|| format!("failed to parse multiaddr {:?}", raw))?;

    let config = config.with_dial_only_onion(onion_only);
    let client = Arc::new(SocksClient::new(config.socks_addr.clone()));
    let transport = OnionTransport::from_config(client, &config, Arc::new(NoUpgrade));

    println!("Address:       {}", addr);
    match parse_onion_multiaddr(&addr) {
        Ok(onion) => println!("Onion address: valid ({})", onion),
        Err(e) => println!("Onion address: invalid ({})", e),
    }
    println!("Plain TCP:     {}", addr.is_tcp());
    println!(
        "Can dial:      {} ({} mode)",
        transport.can_dial(&addr),
        if onion_only { "onion-only" } else { "mixed" }
    );
    debug!(
        "validity={} protocols={:?}",
        is_valid_onion_multiaddr(&addr),
        transport.protocols()
    );

    Ok(())
}

/// Resolve a host name or DNS multiaddr through the SOCKS RESOLVE extension
async fn run_resolve(mut args: Vec<String>) -> Result<()> {
    let config = load_config(&mut args)?;
    let (proxy, timeout) = resolve_settings(&mut args, &config)?;
    let [host] = args.as_slice() else {
        bail!("usage: onionctl resolve <host> [--proxy ADDR] [--timeout SECS] [--config PATH]");
    };

    debug!("Resolving through {} with a {:?} timeout", proxy, timeout);
    let backend: Arc<dyn Backend> = Arc::new(OnionBackend::new(proxy));
    let ctx = Context::with_timeout(timeout);

    // a multiaddr gets its dns segment rewritten, anything else is a bare name
    if host.starts_with('/') {
        let addr: Multiaddr = host
            .parse()
            .with_context(|| format!("failed to parse multiaddr {:?}", host))?;
        info!("Resolving {}", addr);
        for resolved in Resolver::new(backend).resolve(&ctx, &addr).await? {
            println!("{}", resolved);
        }
        return Ok(());
    }

    info!("Resolving {}", host);
    let records = backend.lookup_ip_addr(&ctx, host).await?;
    if records.is_empty() {
        bail!("no addresses found for {}", host);
    }
    for record in records {
        println!("{}", record.ip);
    }

    Ok(())
}

/// Load the config file, or write the defaults if it does not exist
fn run_config(args: Vec<String>) -> Result<()> {
    let path = match args.as_slice() {
        [] => PathBuf::from(defaults::CONFIG_FILE),
        [path] => PathBuf::from(path),
        _ => bail!("usage: onionctl config [PATH]"),
    };

    let config = if path.exists() {
        read_config(&path)?
    } else {
        let config = TransportConfig::default();
        config.to_file(&path)?;
        println!("Saved default configuration to {:?}", path);
        config
    };

    println!("SOCKS address:   {}", config.socks_addr);
    println!("Dial only onion: {}", config.dial_only_onion);
    println!("Lookup timeout:  {}s", config.lookup_timeout_secs);
    for addr in &config.listen_addrs {
        let valid = is_valid_onion_str(addr);
        println!("Listen address:  {} ({})", addr, if valid { "ok" } else { "invalid" });
    }

    Ok(())
}

/// Proxy address and lookup timeout, from flags or else the config
fn resolve_settings(args: &mut Vec<String>, config: &TransportConfig) -> Result<(String, Duration)> {
    let proxy = take_option(args, "--proxy")?.unwrap_or_else(|| config.socks_addr.clone());
    let timeout = match take_option(args, "--timeout")? {
        Some(secs) => Duration::from_secs(
            secs.parse()
                .with_context(|| format!("invalid timeout {:?}", secs))?,
        ),
        None => config.lookup_timeout(),
    };
    Ok((proxy, timeout))
}

/// Configuration named by `--config`, else the default file if present,
/// else the built-in defaults
fn load_config(args: &mut Vec<String>) -> Result<TransportConfig> {
    let explicit = take_option(args, "--config")?;
    let path = PathBuf::from(explicit.as_deref().unwrap_or(defaults::CONFIG_FILE));

    if explicit.is_none() && !path.exists() {
        return Ok(TransportConfig::default());
    }
    read_config(&path)
}

fn read_config(path: &Path) -> Result<TransportConfig> {
    info!("Loading configuration from {:?}", path);
    TransportConfig::from_file(&path.to_path_buf())
        .with_context(|| format!("failed to load configuration from {:?}", path))
}

/// Remove every occurrence of `names` from `args`, reporting whether any was present
fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    let before = args.len();
    args.retain(|a| !names.contains(&a.as_str()));
    args.len() != before
}

/// Remove `name VALUE` from `args`
fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} needs a value", name);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

/// `check` only asks the transport about addresses; it never dials
struct NoUpgrade;

#[async_trait]
impl Upgrader for NoUpgrade {
    async fn upgrade_outbound(
        &self,
        _ctx: &Context,
        _transport: Arc<dyn Transport>,
        _conn: Box<dyn TransportConn>,
        _peer: PeerId,
    ) -> oniontransport_common::Result<Box<dyn SecuredConn>> {
        Err(OnionError::Unsupported("onionctl does not upgrade connections".to_string()))
    }

    async fn upgrade_inbound(
        &self,
        _ctx: &Context,
        _transport: Arc<dyn Transport>,
        _conn: Box<dyn TransportConn>,
    ) -> oniontransport_common::Result<Box<dyn SecuredConn>> {
        Err(OnionError::Unsupported("onionctl does not upgrade connections".to_string()))
    }
}

/// Print help message
fn print_help() {
    println!("onionctl - onion transport operator tool");
    println!();
    println!("USAGE:");
    println!("    onionctl [--verbose] <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    check <multiaddr> [--onion-only]   Validate an address and report CanDial");
    println!("    resolve <host|multiaddr> [--proxy ADDR] [--timeout SECS]");
    println!("                                       Resolve a name through the SOCKS port");
    println!("    config [PATH]                      Show or create {}", defaults::CONFIG_FILE);
    println!("    help                               Show this help message");
    println!("    version                            Show version information");
    println!();
    println!("check and resolve read --config PATH, or {} when present,", defaults::CONFIG_FILE);
    println!("for the SOCKS address, lookup timeout and dial mode.");
    println!();
    println!("EXAMPLES:");
    println!("    onionctl check /onion/timaq4ygg2iegci7:1234");
    println!("    onionctl check /ip4/1.2.3.4/tcp/4001 --onion-only");
    println!("    onionctl resolve example.com --proxy 127.0.0.1:9050");
    println!("    onionctl resolve /dns4/example.com/tcp/443");
}
