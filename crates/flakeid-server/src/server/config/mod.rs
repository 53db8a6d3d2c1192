//! Command line, environment and file configuration for `flakeid-server`.
//!
//! The five core keys (layout, static machine id, orchestrator) go through the
//! [`provider`] chain so that each can come from a long flag, a short alias,
//! the environment, a TOML file or a default. Server-only knobs are plain
//! `clap` arguments with an environment fallback.

pub mod provider;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use flakeid::{ClockPolicy, LayoutParams, static_machine_id};
use provider::{
    ArgProvider, ConfigKey, EPOCH, EnvProvider, FileProvider, Layered, MACHINE_ID,
    MACHINE_ID_BITS, ORCHESTRATOR, SEQUENCE_BITS,
};
use std::path::{Path, PathBuf};

/// Name of the config file looked up in the base directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// How `/generate` renders the id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum IdFormat {
    /// A JSON number.
    #[default]
    Number,
    /// A decimal string, for clients limited to 53-bit integers.
    String,
}

/// Runtime configuration for the `flakeid-server` binary.
///
/// Long flags and their short aliases are separate arguments: when both are
/// given the long flag wins.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flakeid-server",
    version,
    about = "An HTTP service issuing Snowflake IDs"
)]
pub struct CliArgs {
    /// TOML file holding any of the core keys. Without it, `config.toml` in
    /// the base directory is read if present.
    ///
    /// Environment variable: `CONFIG_FILE`
    #[arg(long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Container mode: the base directory is `data/flakeid` under the working
    /// directory instead of `~/.flakeid`, and logs are JSON lines.
    #[arg(long)]
    pub docker: bool,

    /// Width of the machine id field [env: MACHINE_ID_BITS] [default: 10]
    #[arg(long = "machine-id-bits", value_name = "BITS")]
    pub machine_id_bits: Option<String>,

    /// Alias of --machine-id-bits
    #[arg(short = 'M', value_name = "BITS")]
    pub machine_id_bits_alias: Option<String>,

    /// Width of the sequence field [env: SEQUENCE_BITS] [default: 12]
    #[arg(long = "sequence-bits", value_name = "BITS")]
    pub sequence_bits: Option<String>,

    /// Alias of --sequence-bits
    #[arg(short = 'S', value_name = "BITS")]
    pub sequence_bits_alias: Option<String>,

    /// Custom epoch in Unix milliseconds [env: EPOCH] [default: 1704067200000]
    #[arg(long = "epoch", value_name = "MILLIS", allow_negative_numbers = true)]
    pub epoch: Option<String>,

    /// Alias of --epoch
    #[arg(short = 'E', value_name = "MILLIS", allow_negative_numbers = true)]
    pub epoch_alias: Option<String>,

    /// Static machine id, -1 for none [env: MACHINE_ID] [default: -1]
    #[arg(long = "machine-id", value_name = "ID", allow_negative_numbers = true)]
    pub machine_id: Option<String>,

    /// Alias of --machine-id
    #[arg(short = 'I', value_name = "ID", allow_negative_numbers = true)]
    pub machine_id_alias: Option<String>,

    /// Orchestrator address, `none` to disable [env: ORCHESTRATOR_ADDR] [default: none]
    #[arg(long = "orchestrator", value_name = "ADDR")]
    pub orchestrator: Option<String>,

    /// Alias of --orchestrator
    #[arg(short = 'O', value_name = "ADDR")]
    pub orchestrator_alias: Option<String>,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:9567"))]
    pub server_addr: String,

    /// Representation of the id in `/generate` responses.
    ///
    /// Environment variable: `ID_FORMAT`
    #[arg(long, env = "ID_FORMAT", value_enum, default_value_t = IdFormat::Number)]
    pub id_format: IdFormat,

    /// Clock waits longer than this are logged, in milliseconds.
    ///
    /// Environment variable: `STALL_WARN_MS`
    #[arg(long, env = "STALL_WARN_MS", default_value_t = 100)]
    pub stall_warn_ms: u64,

    /// Give up on a backwards clock after this long, in milliseconds. `0`
    /// waits for the clock to catch up however long it takes.
    ///
    /// Environment variable: `REGRESSION_TIMEOUT_MS`
    #[arg(long, env = "REGRESSION_TIMEOUT_MS", default_value_t = 0)]
    pub regression_timeout_ms: u64,

    /// Per-request timeout for orchestrator calls, in milliseconds.
    ///
    /// Environment variable: `ORCHESTRATOR_TIMEOUT_MS`
    #[arg(long, env = "ORCHESTRATOR_TIMEOUT_MS", default_value_t = 2000)]
    pub orchestrator_timeout_ms: u64,

    /// Attempts per orchestrator call when it is unreachable or failing.
    ///
    /// Environment variable: `ORCHESTRATOR_ATTEMPTS`
    #[arg(long, env = "ORCHESTRATOR_ATTEMPTS", default_value_t = 3)]
    pub orchestrator_attempts: u32,

    /// Host part of the name this instance registers under.
    ///
    /// Environment variable: `HOSTNAME`
    #[arg(long, env = "HOSTNAME", default_value_t = String::from("localhost"))]
    pub instance_host: String,
}

impl CliArgs {
    /// Long flags given on the command line.
    pub fn flags(&self) -> ArgProvider {
        ArgProvider::new(
            "command line flag",
            [
                (&MACHINE_ID_BITS, self.machine_id_bits.clone()),
                (&SEQUENCE_BITS, self.sequence_bits.clone()),
                (&EPOCH, self.epoch.clone()),
                (&MACHINE_ID, self.machine_id.clone()),
                (&ORCHESTRATOR, self.orchestrator.clone()),
            ],
        )
    }

    /// Short aliases given on the command line.
    pub fn aliases(&self) -> ArgProvider {
        ArgProvider::new(
            "command line alias",
            [
                (&MACHINE_ID_BITS, self.machine_id_bits_alias.clone()),
                (&SEQUENCE_BITS, self.sequence_bits_alias.clone()),
                (&EPOCH, self.epoch_alias.clone()),
                (&MACHINE_ID, self.machine_id_alias.clone()),
                (&ORCHESTRATOR, self.orchestrator_alias.clone()),
            ],
        )
    }

    /// Directory holding the default config file.
    pub fn base_dir(&self) -> PathBuf {
        base_dir(self.docker, std::env::var_os("HOME").map(PathBuf::from))
    }

    /// The config file to read: the one named explicitly, else
    /// [`CONFIG_FILE_NAME`] in `base_dir` if it exists.
    pub fn config_file(&self, base_dir: &Path) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let candidate = base_dir.join(CONFIG_FILE_NAME);
            candidate.is_file().then_some(candidate)
        })
    }

    /// The full provider chain: flags, aliases, environment, then the config
    /// file if there is one.
    ///
    /// # Errors
    ///
    /// Fails if the config file cannot be read or parsed.
    pub fn layers(&self) -> anyhow::Result<Layered> {
        let layers = Layered::new()
            .with(self.flags())
            .with(self.aliases())
            .with(EnvProvider);
        Ok(match self.config_file(&self.base_dir()) {
            Some(path) => layers.with(FileProvider::from_path(&path)?),
            None => layers,
        })
    }
}

/// `data/flakeid` in container mode, otherwise `.flakeid` under `home` (or
/// the working directory when there is no home).
fn base_dir(docker: bool, home: Option<PathBuf>) -> PathBuf {
    if docker {
        return Path::new("data").join("flakeid");
    }
    home.unwrap_or_default().join(".flakeid")
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub layout: LayoutParams,
    pub static_machine_id: Option<i64>,
    /// Base URL, e.g. `http://orch.internal:9568`.
    pub orchestrator_url: Option<String>,
    pub server_addr: String,
    pub id_format: IdFormat,
    pub clock_policy: ClockPolicy,
    pub orchestrator_timeout: Duration,
    pub orchestrator_attempts: u32,
    pub instance_host: String,
    pub docker: bool,
}

impl ServerConfig {
    /// Builds the configuration from the server knobs in `args` and the core
    /// keys in `layers`.
    ///
    /// # Errors
    ///
    /// Fails if a core key does not parse or a knob is out of range.
    pub fn from_layers(args: &CliArgs, layers: &Layered) -> anyhow::Result<Self> {
        if args.orchestrator_attempts == 0 {
            bail!("ORCHESTRATOR_ATTEMPTS must be greater than 0");
        }
        if args.orchestrator_timeout_ms == 0 {
            bail!("ORCHESTRATOR_TIMEOUT_MS must be greater than 0");
        }

        let layout = LayoutParams {
            machine_id_bits: layers.get(&MACHINE_ID_BITS)?,
            sequence_bits: layers.get(&SEQUENCE_BITS)?,
            epoch_millis: layers.get(&EPOCH)?,
        };
        let regression_timeout =
            (args.regression_timeout_ms > 0).then(|| Duration::from_millis(args.regression_timeout_ms));

        Ok(Self {
            layout,
            static_machine_id: static_machine_id(layers.get(&MACHINE_ID)?),
            orchestrator_url: orchestrator_url(&layers.resolve(&ORCHESTRATOR).value)?,
            server_addr: args.server_addr.clone(),
            id_format: args.id_format,
            clock_policy: ClockPolicy::default()
                .with_stall_warn_after(Duration::from_millis(args.stall_warn_ms))
                .with_regression_timeout(regression_timeout),
            orchestrator_timeout: Duration::from_millis(args.orchestrator_timeout_ms),
            orchestrator_attempts: args.orchestrator_attempts,
            instance_host: args.instance_host.clone(),
            docker: args.docker,
        })
    }
}

/// Turns a configured orchestrator address into a base URL. `none` and the
/// empty string disable the orchestrator; a bare `host:port` gets `http://`.
///
/// The HTTP client is built without TLS, so any other scheme is refused here
/// rather than failing on every call.
fn orchestrator_url(raw: &str) -> anyhow::Result<Option<String>> {
    let raw = raw.trim().trim_end_matches('/');
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match raw.split_once("://") {
        None => Ok(Some(format!("http://{raw}"))),
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("http") => Ok(Some(raw.to_owned())),
        Some((scheme, _)) => bail!(
            "unsupported orchestrator scheme `{scheme}` in {raw}: only http:// is supported"
        ),
    }
}

/// Keys whose value is worth echoing at startup.
pub const CORE_KEYS: [&ConfigKey; 5] = [
    &MACHINE_ID_BITS,
    &SEQUENCE_BITS,
    &EPOCH,
    &MACHINE_ID,
    &ORCHESTRATOR,
];
