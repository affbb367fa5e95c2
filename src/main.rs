#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use seal_bench::config::{SealingOverrides, DEFAULT_MINER_ADDR, DEFAULT_SECTOR_SIZE, DEFAULT_STORAGE_DIR};
use seal_bench::core::SealSeed;
use seal_bench::recovery_cmd::RecoveryArgs;
use seal_bench::sealer::{SealerKind, SealerSettings};
use seal_bench::sealing_cmd::SealingArgs;
use seal_bench::stage_cmd::StageArgs;
use seal_bench::{prove_cmd, recovery_cmd, sealing_cmd, stage_cmd};

#[derive(Parser, Debug)]
#[command(name = "seal-bench")]
#[command(about = "Benchmark sector sealing and proof-of-storage", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set SEAL_BENCH_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    /// Sealer implementation (external or mock)
    #[arg(long, global = true, default_value = "external", value_parser = parse_sealer_kind)]
    sealer: SealerKind,

    /// Path to the external sealer binary
    #[arg(long, global = true)]
    sealer_path: Option<PathBuf>,

    /// Extra arguments passed to the external sealer (shell-quoted)
    #[arg(long, global = true, allow_hyphen_values = true)]
    sealer_args: Option<String>,

    /// Per-operation timeout in seconds (0 disables it)
    #[arg(long, global = true, default_value_t = 0)]
    sealer_timeout: u64,

    /// Disable GPU usage of the proof library
    #[arg(long, global = true)]
    no_gpu: bool,

    #[command(subcommand)]
    command: Commands,
}

fn parse_sealer_kind(s: &str) -> Result<SealerKind, String> {
    s.parse().map_err(|e: seal_bench::BenchError| e.to_string())
}

#[derive(Args, Debug)]
struct StageFlags {
    /// Directory that stores sectors long term
    #[arg(long, default_value = DEFAULT_STORAGE_DIR)]
    storage_dir: PathBuf,
    /// Miner address
    #[arg(long, default_value = DEFAULT_MINER_ADDR)]
    miner_id: String,
    /// Sector number
    #[arg(long, default_value_t = 10)]
    sector_id: u64,
    /// Size of the sector, e.g. 32GiB (used by addpiece)
    #[arg(long, default_value = DEFAULT_SECTOR_SIZE)]
    sector_size: String,
    /// Directory of the stage checkpoint files
    #[arg(long, default_value = ".")]
    checkpoint_dir: PathBuf,
}

impl From<StageFlags> for StageArgs {
    fn from(f: StageFlags) -> Self {
        StageArgs {
            storage_dir: f.storage_dir,
            miner_id: f.miner_id,
            sector_id: f.sector_id,
            sector_size: f.sector_size,
            checkpoint_dir: f.checkpoint_dir,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Benchmark the whole sealing pipeline and proof-of-storage
    Sealing {
        /// TOML run file; explicit flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory that stores sectors long term
        #[arg(long)]
        storage_dir: Option<PathBuf>,
        /// Size of the sectors, e.g. 32GiB
        #[arg(long)]
        sector_size: Option<String>,
        /// Miner address
        #[arg(long)]
        miner_addr: Option<String>,
        /// Number of sectors to seal
        #[arg(long)]
        num_sectors: Option<u64>,
        /// Number of the first sector
        #[arg(long)]
        first_sector: Option<u64>,
        /// Number of workers; must divide the sector count
        #[arg(long)]
        parallel: Option<usize>,
        /// Max sectors in PreCommit2 at once
        #[arg(long)]
        precommit2_parallel: Option<usize>,
        /// Max sectors in Commit1 at once
        #[arg(long)]
        commit1_parallel: Option<usize>,
        /// Max sectors in Commit2 at once
        #[arg(long)]
        commit2_parallel: Option<usize>,
        /// Skip Commit2, seal verification and proof-of-storage
        #[arg(long)]
        skip_commit2: bool,
        /// Skip seal verification
        #[arg(long)]
        skip_verify: bool,
        /// Skip unsealing
        #[arg(long)]
        skip_unseal: bool,
        /// Preimage the sector tickets are derived from
        #[arg(long)]
        ticket_preimage: Option<String>,
        /// Derive a distinct interactive seed per sector
        #[arg(long)]
        per_sector_seed: bool,
        /// Save Commit2 inputs to this file (one per sector for larger runs)
        #[arg(long)]
        save_commit2_input: Option<PathBuf>,
        /// Prove the sectors of an existing sealed directory instead of sealing
        #[arg(long)]
        benchmark_existing_sectorbuilder: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json_out: bool,
        /// Append the report to this JSONL file
        #[arg(long)]
        jsonl: Option<PathBuf>,
        /// Export per-sector timings to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Benchmark AddPiece
    Addpiece {
        #[command(flatten)]
        stage: StageFlags,
    },

    /// Benchmark PreCommit1
    Precommit1 {
        #[command(flatten)]
        stage: StageFlags,
        /// Ticket as 64 hex chars (a fixed ticket is used otherwise)
        #[arg(long, default_value = "")]
        ticket: String,
    },

    /// Benchmark PreCommit2
    Precommit2 {
        #[command(flatten)]
        stage: StageFlags,
    },

    /// Benchmark Commit1
    Commit1 {
        #[command(flatten)]
        stage: StageFlags,
        /// Interactive seed as 64 hex chars (a fixed seed is used otherwise)
        #[arg(long, default_value = "")]
        seed: String,
        /// Epoch of the interactive seed
        #[arg(long, default_value_t = SealSeed::DEFAULT_EPOCH)]
        seed_height: i64,
    },

    /// Benchmark Commit2
    Commit2 {
        #[command(flatten)]
        stage: StageFlags,
        /// Commit2 input (defaults to c2in.json in the checkpoint directory)
        input: Option<PathBuf>,
    },

    /// Benchmark a proof computation from a Commit2 input file
    Prove {
        /// Commit2 input file
        input: PathBuf,
        /// Miner address
        #[arg(long, default_value = DEFAULT_MINER_ADDR)]
        miner_addr: String,
        /// Directory handed to the sealer as its storage root
        #[arg(long, default_value = DEFAULT_STORAGE_DIR)]
        storage_dir: PathBuf,
    },

    /// Regenerate a sealed sector from its original ticket
    Recovery {
        /// Directory that stores sectors long term
        #[arg(long, default_value = DEFAULT_STORAGE_DIR)]
        storage_dir: PathBuf,
        /// Size of the sector, e.g. 32GiB
        #[arg(long, default_value = "2KiB")]
        sector_size: String,
        /// Miner address
        #[arg(long, default_value = DEFAULT_MINER_ADDR)]
        miner_id: String,
        /// Sector number
        #[arg(long, default_value_t = 10)]
        sector_id: u64,
        /// Ticket the sector was sealed with (64 hex chars)
        #[arg(long)]
        ticket: String,
        /// Keep the unsealed copy and the sector cache
        #[arg(long)]
        clear: bool,
    },
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("SEAL_BENCH_LOG").unwrap_or_else(|_| {
        if verbose { "seal_bench=debug".to_string() } else { "seal_bench=info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = SealerSettings {
        kind: cli.sealer,
        path: cli.sealer_path,
        args: cli.sealer_args,
        timeout: Duration::from_secs(cli.sealer_timeout),
        no_gpu: cli.no_gpu,
    };

    let result = match cli.command {
        Commands::Sealing {
            config,
            storage_dir,
            sector_size,
            miner_addr,
            num_sectors,
            first_sector,
            parallel,
            precommit2_parallel,
            commit1_parallel,
            commit2_parallel,
            skip_commit2,
            skip_verify,
            skip_unseal,
            ticket_preimage,
            per_sector_seed,
            save_commit2_input,
            benchmark_existing_sectorbuilder,
            json_out,
            jsonl,
            csv,
        } => {
            let overrides = SealingOverrides {
                storage_dir,
                sector_size,
                miner_addr,
                num_sectors,
                first_sector,
                ticket_preimage,
                per_sector_seed,
                skip_commit2,
                skip_verify,
                skip_unseal,
                save_commit2_input,
                workers: parallel,
                precommit2: precommit2_parallel,
                commit1: commit1_parallel,
                commit2: commit2_parallel,
            };
            sealing_cmd::run(
                &settings,
                SealingArgs {
                    config,
                    overrides,
                    existing: benchmark_existing_sectorbuilder,
                    json_out,
                    jsonl,
                    csv,
                },
            )
        }
        Commands::Addpiece { stage } => stage_cmd::add_piece(&settings, &stage.into()).map(|_| ()),
        Commands::Precommit1 { stage, ticket } => {
            stage_cmd::pre_commit1(&settings, &stage.into(), &ticket).map(|_| ())
        }
        Commands::Precommit2 { stage } => stage_cmd::pre_commit2(&settings, &stage.into()).map(|_| ()),
        Commands::Commit1 { stage, seed, seed_height } => {
            stage_cmd::commit1(&settings, &stage.into(), &seed, seed_height).map(|_| ())
        }
        Commands::Commit2 { stage, input } => {
            stage_cmd::commit2(&settings, &stage.into(), input).map(|_| ())
        }
        Commands::Prove { input, miner_addr, storage_dir } => {
            prove_cmd::run(&settings, input, miner_addr, storage_dir)
        }
        Commands::Recovery { storage_dir, sector_size, miner_id, sector_id, ticket, clear } => {
            recovery_cmd::run(
                &settings,
                RecoveryArgs { storage_dir, sector_size, miner_id, sector_id, ticket, clear },
            )
        }
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
