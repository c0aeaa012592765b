//! chainvault: client for the per-recipient encrypted ledger
//!
//! Commands:
//!   keygen                          - create a key pair (PKCS#8 private PEM + SPKI public PEM)
//!   whoami                          - show identity and derived channels
//!   publish <file>                  - chunk, encrypt and admit a file; prints its meta reference
//!   list [--channel <c>]            - files readable in a channel (default: own files)
//!   get <ref> [-o <out>]            - reassemble a file from a meta or share reference
//!   share <ref> <recipient.pub>     - grant a recipient access to an owned file
//!   reshare <share-ref> <recipient> - pass on access held through a share
//!   shared                          - shares addressed to this identity
//!   tag <ref> <label> <value>       - attach a private tag to a record
//!   tags <ref>                      - list own tags on a record
//!   config show                     - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use cv_chain::{DiskCache, LocalLedger};
use cv_core::config::ChainVaultConfig;
use cv_core::{RecordKind, Reference};
use cv_crypto::{KeyPair, PublicKey};
use cv_engine::{PublishRequest, Session, Vault};

const DEFAULT_CONFIG: &str = "~/.config/chainvault/config.toml";
const DEFAULT_KEY: &str = "~/.config/chainvault/key.pem";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "chainvault",
    version,
    about = "Encrypted file sharing over a hash-linked ledger"
)]
struct Cli {
    /// Path to chainvault.toml configuration file
    #[arg(long, short = 'c', env = "CHAINVAULT_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Private key (PKCS#8 PEM); overrides identity.private_key
    #[arg(long, short = 'k', env = "CHAINVAULT_KEY")]
    key: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(long, env = "CHAINVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides logging.format
    #[arg(long, env = "CHAINVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new RSA key pair
    Keygen {
        /// Where to write the private key (public key goes to <out>.pub)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = cv_crypto::DEFAULT_RSA_BITS)]
        bits: usize,
        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    /// Show the active identity and its channels
    Whoami,

    /// Publish a file to the ledger
    Publish {
        file: PathBuf,
        /// Display name (default: file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
        /// Small preview to publish alongside the file
        #[arg(long)]
        preview: Option<PathBuf>,
        /// Target channel (default: files/<identity>)
        #[arg(long)]
        channel: Option<String>,
    },

    /// List files readable in a channel
    List {
        #[arg(long)]
        channel: Option<String>,
    },

    /// Reassemble a file from a meta reference or a share reference
    Get {
        /// channel@hash
        reference: Reference,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Fetch the preview instead of the content
        #[arg(long)]
        preview: bool,
    },

    /// Share an owned file with a recipient
    Share {
        /// Meta reference (channel@hash)
        reference: Reference,
        /// Recipient public key (SPKI PEM)
        recipient: PathBuf,
    },

    /// Pass on access held through a share
    Reshare {
        /// Share reference (channel@hash)
        reference: Reference,
        /// Recipient public key (SPKI PEM)
        recipient: PathBuf,
    },

    /// List shares addressed to this identity
    Shared,

    /// Attach a private tag to a record
    Tag {
        reference: Reference,
        label: String,
        value: String,
    },

    /// List own tags on a record
    Tags { reference: Reference },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let (config, from_file) = load_config(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.logging.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(&level, &format);

    if !from_file {
        warn!("config file not found: {}  (using defaults)", config_path.display());
    }

    let key_path = expand_tilde(
        cli.key
            .as_deref()
            .or(config.identity.private_key.as_deref())
            .unwrap_or_else(|| Path::new(DEFAULT_KEY)),
    );

    match cli.command {
        Commands::Keygen { out, bits, force } => {
            let out = out.map(|p| expand_tilde(&p)).unwrap_or(key_path);
            cmd_keygen(&out, bits, force)
        }
        Commands::Config { action: ConfigAction::Show } => {
            cmd_config_show(&config, &config_path, from_file)
        }
        command => {
            let session = load_session(&key_path)?;
            let vault = open_vault(&config)?;
            run(command, &vault, &session)
        }
    }
}

fn run(command: Commands, vault: &Vault, session: &Session) -> Result<()> {
    match command {
        Commands::Whoami => cmd_whoami(session),
        Commands::Publish {
            file,
            name,
            mime,
            preview,
            channel,
        } => cmd_publish(
            vault,
            session,
            &file,
            name.as_deref(),
            &mime,
            preview.as_deref(),
            channel,
        ),
        Commands::List { channel } => cmd_list(vault, session, channel),
        Commands::Get {
            reference,
            out,
            preview,
        } => cmd_get(vault, session, &reference, out.as_deref(), preview),
        Commands::Share {
            reference,
            recipient,
        } => {
            let recipient = load_public_key(&recipient)?;
            let receipt = vault.sharing.share(session, &reference, &recipient)?;
            println!("{}", receipt.reference);
            Ok(())
        }
        Commands::Reshare {
            reference,
            recipient,
        } => {
            let recipient = load_public_key(&recipient)?;
            let receipt = vault.sharing.reshare(session, &reference, &recipient)?;
            println!("{}", receipt.reference);
            Ok(())
        }
        Commands::Shared => cmd_shared(vault, session),
        Commands::Tag {
            reference,
            label,
            value,
        } => {
            let receipt = vault
                .tagger
                .tag(session, &reference, &label, value.as_bytes())?;
            println!("{}", receipt.reference);
            Ok(())
        }
        Commands::Tags { reference } => {
            for t in vault.tagger.tags_for(session, &reference)? {
                println!("{}={}", t.tag.label, String::from_utf8_lossy(&t.tag.value));
            }
            Ok(())
        }
        Commands::Keygen { .. } | Commands::Config { .. } => {
            anyhow::bail!("command runs without a vault")
        }
    }
}

// ── Config, logging, wiring ───────────────────────────────────────────────────

/// Load the config file, or defaults when it does not exist. The flag reports which.
fn load_config(path: &Path) -> Result<(ChainVaultConfig, bool)> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = ChainVaultConfig::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((ChainVaultConfig::default(), false))
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

/// Block cache plus the on-disk ledger peer used for fetches and admission.
fn open_vault(config: &ChainVaultConfig) -> Result<Vault> {
    let cache_dir = expand_tilde(&config.cache.dir);
    let cache = DiskCache::open(cache_dir.clone(), config.cache.max_mb.saturating_mul(1024 * 1024))
        .with_context(|| format!("opening block cache: {}", cache_dir.display()))?;

    let ledger_dir = expand_tilde(&config.ledger.dir);
    let store = DiskCache::open(ledger_dir.clone(), u64::MAX)
        .with_context(|| format!("opening ledger: {}", ledger_dir.display()))?;
    let network = LocalLedger::new(Arc::new(store));

    Ok(Vault::new(Arc::new(cache), Arc::new(network), config))
}

fn load_session(path: &Path) -> Result<Session> {
    let pem = std::fs::read_to_string(path).with_context(|| {
        format!(
            "reading private key: {}\nCreate one with: chainvault keygen",
            path.display()
        )
    })?;
    let keys = KeyPair::from_pem(&pem)
        .with_context(|| format!("parsing private key: {}", path.display()))?;
    Ok(Session::new(keys))
}

fn load_public_key(path: &Path) -> Result<PublicKey> {
    let path = expand_tilde(path);
    let pem = std::fs::read_to_string(&path)
        .with_context(|| format!("reading public key: {}", path.display()))?;
    PublicKey::from_pem(&pem).with_context(|| format!("parsing public key: {}", path.display()))
}

fn public_key_path(private: &Path) -> PathBuf {
    let mut name = private.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_keygen(out: &Path, bits: usize, force: bool) -> Result<()> {
    if out.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            out.display()
        );
    }
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let keys = KeyPair::generate_with_bits(bits).context("generating key pair")?;
    let private = keys.to_pem().context("encoding private key")?;
    std::fs::write(out, private.as_bytes())
        .with_context(|| format!("writing {}", out.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(out, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions on {}", out.display()))?;
    }

    let public_path = public_key_path(out);
    let public = keys.public().to_pem().context("encoding public key")?;
    std::fs::write(&public_path, public)
        .with_context(|| format!("writing {}", public_path.display()))?;

    info!(identity = keys.identity(), bits, "key pair generated");
    println!("identity:    {}", keys.identity());
    println!("private key: {}", out.display());
    println!("public key:  {}", public_path.display());
    Ok(())
}

fn cmd_whoami(session: &Session) -> Result<()> {
    println!("identity: {}", session.identity());
    println!("files:    {}", session.files_channel());
    println!("shares:   {}", session.shares_channel());
    println!("tags:     {}", session.tags_channel());
    Ok(())
}

fn cmd_publish(
    vault: &Vault,
    session: &Session,
    file: &Path,
    name: Option<&str>,
    mime: &str,
    preview: Option<&Path>,
    channel: Option<String>,
) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let preview = preview
        .map(|p| std::fs::read(p).with_context(|| format!("reading preview {}", p.display())))
        .transpose()?;
    let default_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let channel = channel.unwrap_or_else(|| session.files_channel());

    let meta_ref = vault.publisher.publish(
        session,
        &channel,
        PublishRequest {
            name: name.unwrap_or(&default_name),
            mime_type: mime,
            data: &data,
            preview: preview.as_deref(),
        },
    )?;
    println!("{meta_ref}");
    Ok(())
}

fn cmd_list(vault: &Vault, session: &Session, channel: Option<String>) -> Result<()> {
    let channel = channel.unwrap_or_else(|| session.files_channel());
    for resolved in vault.resolver.visible(session, &channel)? {
        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => {
                warn!(channel = %channel, error = %e, "record could not be opened");
                continue;
            }
        };
        if resolved.kind != RecordKind::Meta {
            continue;
        }
        let meta = resolved.meta()?;
        println!("{}  {:>12}  {}", resolved.reference(), meta.size, meta.name);
    }
    Ok(())
}

fn cmd_get(
    vault: &Vault,
    session: &Session,
    reference: &Reference,
    out: Option<&Path>,
    preview: bool,
) -> Result<()> {
    let bytes = if preview {
        vault
            .reader
            .read_any_preview(session, reference)?
            .context("no preview available")?
    } else {
        vault.reader.read_any(session, reference, None)?.bytes
    };

    match out {
        Some(path) => std::fs::write(path, &bytes)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("writing to stdout")?;
            stdout.flush().context("writing to stdout")?;
        }
    }
    Ok(())
}

fn cmd_shared(vault: &Vault, session: &Session) -> Result<()> {
    for receipt in vault.sharing.received(session)? {
        let receipt = match receipt {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "share could not be opened");
                continue;
            }
        };
        match vault.reader.shared_meta(session, &receipt.share) {
            Ok((_, meta)) => println!("{}  {:>12}  {}", receipt.reference, meta.size, meta.name),
            Err(e) => warn!(share = %receipt.reference, error = %e, "shared file unavailable"),
        }
    }
    Ok(())
}

fn cmd_config_show(config: &ChainVaultConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
