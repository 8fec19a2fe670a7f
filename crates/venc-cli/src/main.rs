//! venc: VENC file encryption CLI
//!
//! Commands:
//!   encrypt <file>                 - write <stem>.venc and a <stem>.vkey recovery key
//!   decrypt <file.venc> [-k vkey]  - restore the original file under its stored name
//!   inspect <file.venc>            - show identifier, stored filename and digest
//!   config show                    - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use venc_core::config::VencConfig;
use venc_core::{ProgressEvent, Stage, VencResult};
use venc_crypto::header::DEFAULT_FILENAME;
use venc_crypto::identifier::IDENTIFIER_MAGIC;
use venc_crypto::{CipherParams, Credential, EngineOptions, EscrowBlob, Integrity};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "venc",
    version,
    about = "VENC file encryption",
    long_about = "venc: encrypt files into password-protected .venc containers with a recovery key"
)]
struct Cli {
    /// Path to venc.toml configuration file
    #[arg(long, short = 'c', env = "VENC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "VENC_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides the config file
    #[arg(long, env = "VENC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file into a .venc container and a .vkey recovery key
    Encrypt {
        /// File to encrypt
        input: PathBuf,
        /// Output directory (default: config output.dir, else next to the input)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Read the password from this environment variable instead of prompting
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
        /// Also print the recovery key as base64 on stdout
        #[arg(long)]
        print_recovery_key: bool,
        /// Replace existing output files
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Decrypt a .venc container with its password or recovery key
    Decrypt {
        /// Container to decrypt
        input: PathBuf,
        /// Recovery key file (raw .vkey or base64 text); skips the password
        #[arg(long, short = 'k')]
        recovery_key: Option<PathBuf>,
        /// Output directory (default: config output.dir, else next to the input)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Read the password from this environment variable instead of prompting
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
        /// Treat a digest mismatch as an error and write nothing
        #[arg(long)]
        strict: bool,
        /// Replace an existing output file
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Show container metadata without decrypting
    Inspect {
        /// Container to inspect
        input: PathBuf,
    },

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

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = load_config(cli.config.as_deref()).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.log.format));
    init_logging(&level, format);

    if let ConfigSource::Missing(path) = &source {
        warn!("config file not found: {}  (using defaults)", path.display());
    }
    debug!(version = env!("CARGO_PKG_VERSION"), ?source, "venc starting");

    config
        .crypto
        .validate()
        .context("invalid [crypto] configuration")?;

    match cli.command {
        Commands::Encrypt {
            input,
            output_dir,
            password_env,
            print_recovery_key,
            force,
        } => {
            cmd_encrypt(
                &config,
                &input,
                output_dir.as_deref(),
                password_env.as_deref(),
                print_recovery_key,
                force,
            )
            .await
        }
        Commands::Decrypt {
            input,
            recovery_key,
            output_dir,
            password_env,
            strict,
            force,
        } => {
            cmd_decrypt(
                &config,
                &input,
                recovery_key.as_deref(),
                output_dir.as_deref(),
                password_env.as_deref(),
                strict,
                force,
            )
            .await
        }
        Commands::Inspect { input } => cmd_inspect(&config, &input).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &source),
    }
}

fn init_logging(level: &str, format: LogFormat) {
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

// ── Config loading ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    Defaults,
}

async fn load_config(path: Option<&Path>) -> Result<(VencConfig, ConfigSource)> {
    let Some(path) = path else {
        return Ok((VencConfig::default(), ConfigSource::Defaults));
    };
    if !path.exists() {
        return Ok((VencConfig::default(), ConfigSource::Missing(path.to_path_buf())));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok((config, ConfigSource::File(path.to_path_buf())))
}

// ── Paths and inputs ──────────────────────────────────────────────────────────

/// Output directory: CLI flag > config > the input's directory
fn resolve_output_dir(config: &VencConfig, input: &Path, override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    if let Some(dir) = &config.output.dir {
        return dir.clone();
    }
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Reduce a stored filename to a plain basename safe to create in the output directory.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('\0', "");
    if base.is_empty() || base == "." || base == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        base
    }
}

fn ensure_writable(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "{} already exists (use --force or set output.overwrite = true)",
            path.display()
        );
    }
    Ok(())
}

fn read_password(env_var: Option<&str>, confirm: bool) -> Result<SecretString> {
    if let Some(var) = env_var {
        let value = std::env::var(var)
            .with_context(|| format!("password environment variable {var} is not set"))?;
        return Ok(SecretString::from(value));
    }

    let password = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let mut again =
            rpassword::prompt_password("Confirm password: ").context("reading password")?;
        let matches = again == password;
        again.zeroize();
        if !matches {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(password))
}

/// Load a recovery key: raw bytes as written by `encrypt`, or its base64 text form.
async fn read_recovery_key(path: &Path) -> Result<EscrowBlob> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading recovery key: {}", path.display()))?;

    let blob = if bytes.starts_with(IDENTIFIER_MAGIC) {
        EscrowBlob::from_bytes(&bytes)
    } else {
        let text = String::from_utf8(bytes)
            .with_context(|| format!("recovery key {} is neither raw nor base64", path.display()))?;
        EscrowBlob::from_base64(&text)
    };
    blob.with_context(|| format!("parsing recovery key: {}", path.display()))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

/// Positions are hundredths of a percent.
const PROGRESS_SCALE: f64 = 100.0;

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new((100.0 * PROGRESS_SCALE) as u64);
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{bar:40.cyan/blue}] {percent:>3}% {msg}",
    )
    .map(|s| s.progress_chars("=>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb
}

async fn drive_progress(mut rx: UnboundedReceiver<ProgressEvent>, pb: ProgressBar) {
    while let Some(event) = rx.recv().await {
        match event.stage {
            Stage::Processing => {
                pb.set_message("processing");
                pb.set_position((event.percent * PROGRESS_SCALE) as u64);
            }
            Stage::Merging => {
                pb.set_message("merging");
                pb.set_position(pb.length().unwrap_or(0));
            }
        }
    }
}

/// Run a blocking engine call with a progress bar; Ctrl-C cancels it.
async fn run_engine<T, F>(label: &str, params: CipherParams, op: F) -> Result<T>
where
    F: FnOnce(EngineOptions) -> VencResult<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = unbounded_channel();
    let cancel = CancellationToken::new();
    let options = EngineOptions::new(params)
        .with_progress(tx)
        .with_cancel(cancel.clone());

    let pb = make_progress_bar(label);
    let progress = tokio::spawn(drive_progress(rx, pb.clone()));
    let mut task = tokio::task::spawn_blocking(move || op(options));

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            pb.set_message("cancelling");
            cancel.cancel();
            task.await
        }
    };

    // the sender is dropped with the engine options, which ends the progress task
    let _ = progress.await;
    pb.finish_and_clear();

    joined.context("engine task failed")?.map_err(|e| {
        debug!(kind = %e.kind(), "{label} failed");
        e.into()
    })
}

// ── `venc encrypt` ────────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &VencConfig,
    input: &Path,
    output_dir: Option<&Path>,
    password_env: Option<&str>,
    print_recovery_key: bool,
    force: bool,
) -> Result<()> {
    let plaintext = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let filename = input
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned);
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_owned();

    let dir = resolve_output_dir(config, input, output_dir);
    let container_path = dir.join(format!("{stem}.{}", venc_crypto::CONTAINER_EXTENSION));
    let key_path = dir.join(format!("{stem}.{}", config.output.recovery_key_extension));
    let overwrite = force || config.output.overwrite;
    ensure_writable(&container_path, overwrite)?;
    ensure_writable(&key_path, overwrite)?;

    let password = read_password(password_env, true)?;
    if password.expose_secret().is_empty() {
        anyhow::bail!("a non-empty password is required to encrypt");
    }

    let size = plaintext.len();
    let params = CipherParams::from(&config.crypto);
    let out = run_engine("encrypt", params, move |options| {
        venc_crypto::encrypt(&plaintext, &password, filename.as_deref(), &options)
    })
    .await
    .with_context(|| format!("encrypting {}", input.display()))?;

    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    tokio::fs::write(&container_path, &out.container)
        .await
        .with_context(|| format!("writing {}", container_path.display()))?;
    tokio::fs::write(&key_path, out.escrow.to_bytes())
        .await
        .with_context(|| format!("writing {}", key_path.display()))?;

    info!(
        input = %input.display(),
        container = %container_path.display(),
        bytes = size,
        identifier = %out.escrow.identifier(),
        "encrypted"
    );
    eprintln!("encrypted:    {} -> {}", input.display(), container_path.display());
    eprintln!("recovery key: {}", key_path.display());
    if print_recovery_key {
        println!("{}", out.escrow.to_base64());
    }
    Ok(())
}

// ── `venc decrypt` ────────────────────────────────────────────────────────────

async fn cmd_decrypt(
    config: &VencConfig,
    input: &Path,
    recovery_key: Option<&Path>,
    output_dir: Option<&Path>,
    password_env: Option<&str>,
    strict: bool,
    force: bool,
) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_owned();
    venc_crypto::check_extension(&extension)
        .with_context(|| format!("refusing to decrypt {}", input.display()))?;

    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;

    let escrow = match recovery_key {
        Some(path) => Some(read_recovery_key(path).await?),
        None => None,
    };
    let password = match escrow {
        Some(_) => None,
        None => Some(read_password(password_env, false)?),
    };
    let credential = Credential::from_parts(password, escrow)?;

    let params = CipherParams::from(&config.crypto);
    let decrypted = run_engine("decrypt", params, move |options| {
        venc_crypto::decrypt(&data, &credential, Some(&extension), &options)
    })
    .await
    .with_context(|| format!("decrypting {}", input.display()))?;

    let decrypted = if strict {
        decrypted
            .into_verified()
            .with_context(|| format!("integrity check failed for {}", input.display()))?
    } else {
        decrypted
    };
    if let Integrity::Mismatch { expected, actual } = decrypted.integrity() {
        eprintln!(
            "warning: integrity check failed; the stored digest {} does not match {}",
            hex::encode(expected),
            hex::encode(actual)
        );
    }

    let name = sanitize_filename(decrypted.filename());
    let dir = resolve_output_dir(config, input, output_dir);
    let out_path = dir.join(&name);
    ensure_writable(&out_path, force || config.output.overwrite)?;

    let (plaintext, _, _) = decrypted.into_parts();
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    tokio::fs::write(&out_path, &plaintext)
        .await
        .with_context(|| format!("writing {}", out_path.display()))?;

    info!(input = %input.display(), output = %out_path.display(), bytes = plaintext.len(), "decrypted");
    eprintln!("decrypted: {} -> {}", input.display(), out_path.display());
    Ok(())
}

// ── `venc inspect` ────────────────────────────────────────────────────────────

async fn cmd_inspect(config: &VencConfig, input: &Path) -> Result<()> {
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let info = venc_crypto::inspect(&data, &CipherParams::from(&config.crypto))
        .with_context(|| format!("inspecting {}", input.display()))?;

    println!("file:          {}", input.display());
    println!("identifier:    {}", info.identifier);
    println!("filename:      {}", info.filename);
    println!("sha256:        {}", hex::encode(&info.digest));
    println!("header offset: {}", info.header_offset);
    println!("content at:    {} (expected)", info.content_offset_hint);
    println!("size:          {} bytes", info.total_len);
    Ok(())
}

// ── `venc config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &VencConfig, source: &ConfigSource) -> Result<()> {
    match source {
        ConfigSource::File(path) => println!("# Configuration from: {}", path.display()),
        ConfigSource::Missing(path) => {
            println!("# Configuration: defaults (no file at {})", path.display())
        }
        ConfigSource::Defaults => println!("# Configuration: defaults"),
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
