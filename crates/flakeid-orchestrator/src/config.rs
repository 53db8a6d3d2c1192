use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Largest machine id width the allocator accepts. Matches the widest layout
/// a generator can validate with at least one timestamp bit and no sequence.
const MAX_MACHINE_ID_BITS: u32 = 62;

/// Runtime configuration for the `flakeid-orchestrator` binary.
///
/// Values come from CLI arguments or environment variables (a `.env` file is
/// loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flakeid-orchestrator",
    version,
    about = "Hands out leased machine ids to flakeid servers"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `LISTEN_ADDR`
    #[arg(long, env = "LISTEN_ADDR", default_value_t = String::from("0.0.0.0:9568"))]
    pub listen_addr: String,

    /// Width of the machine id field; the pool is `[0, 2^bits - 1]`.
    ///
    /// Servers with a narrower layout only receive ids they can encode.
    ///
    /// Environment variable: `MACHINE_ID_BITS`
    #[arg(long, env = "MACHINE_ID_BITS", default_value_t = 10)]
    pub machine_id_bits: u32,

    /// How long a lease lives without a renewal, in milliseconds.
    ///
    /// Environment variable: `LEASE_TTL_MS`
    #[arg(long, env = "LEASE_TTL_MS", default_value_t = 30_000)]
    pub lease_ttl_ms: u64,

    /// How long an expired id is withheld before it is granted again, in
    /// milliseconds. Defaults to the lease ttl and may not be shorter.
    ///
    /// Environment variable: `LEASE_GRACE_MS`
    #[arg(long, env = "LEASE_GRACE_MS")]
    pub grace_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub listen_addr: String,
    pub pool_max: i64,
    pub lease_ttl: Duration,
    pub grace: Duration,
}

impl TryFrom<CliArgs> for OrchestratorConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.machine_id_bits > MAX_MACHINE_ID_BITS {
            bail!(
                "MACHINE_ID_BITS ({}) exceeds the maximum of {}",
                args.machine_id_bits,
                MAX_MACHINE_ID_BITS
            );
        }
        if args.lease_ttl_ms == 0 {
            bail!("LEASE_TTL_MS must be greater than 0");
        }

        // A holder only notices its lease is gone a full ttl after its last
        // renewal reached it, which is later than the expiry recorded here.
        // The quarantine has to cover that gap.
        if let Some(grace_ms) = args.grace_ms.filter(|&ms| ms < args.lease_ttl_ms) {
            bail!(
                "LEASE_GRACE_MS ({grace_ms}) must be at least LEASE_TTL_MS ({})",
                args.lease_ttl_ms
            );
        }

        let lease_ttl = Duration::from_millis(args.lease_ttl_ms);
        Ok(Self {
            listen_addr: args.listen_addr,
            pool_max: (1_i64 << args.machine_id_bits) - 1,
            lease_ttl,
            grace: args.grace_ms.map_or(lease_ttl, Duration::from_millis),
        })
    }
}
