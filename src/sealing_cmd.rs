use std::path::PathBuf;

use crate::config::{SealingConfig, SealingOverrides};
use crate::core::{BenchResults, SealedSectorInfo};
use crate::engine::{random_challenge, run_post, run_seals};
use crate::report::{TextSections, render_json, render_text};
use crate::sealer::SealerSettings;
use crate::storage::{CsvExporter, JsonlWriter, load_preseal_sectors};
use crate::store::SectorStore;
use crate::{BenchError, BenchResult, collect_system_info, expand_home};

/// Options of the whole-pipeline benchmark that are not part of the run config.
#[derive(Debug, Clone, Default)]
pub struct SealingArgs {
    pub config: Option<PathBuf>,
    pub overrides: SealingOverrides,
    /// Prove the sectors of an existing sealed directory instead of sealing.
    pub existing: Option<PathBuf>,
    pub json_out: bool,
    pub jsonl: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

/// Run the sealing benchmark and return its report.
///
/// Anomalies are part of the report; the caller decides how to treat them.
pub fn bench(settings: &SealerSettings, args: &SealingArgs) -> BenchResult<BenchResults> {
    let cfg = SealingConfig::resolve(args.config.as_deref(), args.overrides.clone())?;
    let plan = cfg.plan()?;
    if args.existing.is_none() {
        plan.validate()?;
    }
    let env = settings.env();

    // Sealing works in a scratch directory that is removed afterwards.
    let _scratch;
    let store = match &args.existing {
        Some(dir) => SectorStore::new(expand_home(dir)),
        None => {
            let root = expand_home(&cfg.storage_dir);
            std::fs::create_dir_all(&root)?;
            let tmp = tempfile::Builder::new().prefix("bench").tempdir_in(&root)?;
            let store = SectorStore::open(tmp.path())?;
            _scratch = tmp;
            store
        }
    };
    tracing::info!(root = %store.root().display(), "using sector storage");

    let sealer = settings.build(&store, &env)?;
    if let Some(v) = sealer.version() {
        tracing::info!(sealer = sealer.name(), version = %v, "sealer ready");
    }

    let (mut results, sealed): (BenchResults, Vec<SealedSectorInfo>) = match &args.existing {
        None => {
            let run = run_seals(sealer.as_ref(), &store, &plan)?;
            let mut results = BenchResults::from_run(plan.sector_size, &run);
            results.sum_sealing_time()?;
            (results, run.sealed_sectors())
        }
        Some(_) => {
            let sealed = load_preseal_sectors(store.root(), &cfg.miner_addr)?;
            (BenchResults::new(plan.sector_size, sealed.len(), Vec::new()), sealed)
        }
    };

    if !cfg.skip_commit2 {
        let challenge = random_challenge();
        let post = run_post(sealer.as_ref(), plan.miner, &sealed, &challenge)?;
        results.set_post(post);
    }

    results.set_env(&env);
    results.system = Some(collect_system_info());
    Ok(results)
}

pub fn run(settings: &SealerSettings, args: SealingArgs) -> BenchResult<()> {
    let results = bench(settings, &args)?;

    if args.json_out {
        println!("{}", render_json(&results)?);
    } else {
        let sections = TextSections {
            sealing: args.existing.is_none(),
            unseal: !results.sealing_results.is_empty() && !results.sealing_sum.unseal.is_zero(),
        };
        print!("{}", render_text(&results, sections));
    }

    if let Some(path) = &args.jsonl {
        JsonlWriter::new(path).append(&results)?;
        eprintln!("appended results to {}", path.display());
    }
    if let Some(path) = &args.csv {
        CsvExporter::new().export(&results, path)?;
        eprintln!("wrote {}", path.display());
    }

    if results.has_anomalies() {
        return Err(BenchError::Message(format!(
            "{} proof(s) failed verification",
            results.anomalies.len()
        )));
    }
    Ok(())
}
