use std::env;
use std::process::ExitCode;

use petsim::{load_profile_defs, ProfileTable, SimConfig, Simulation};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod dump;
mod host_config;
mod loop_runner;
mod metrics;
mod stage;

use dump::StageDump;
use host_config::{parse_args, usage_text, HostArgs, HostConfig, HostError};
use loop_runner::StageRunner;

fn main() -> ExitCode {
    init_tracing();
    info!("=== petsim host startup ===");

    match run_host() {
        Ok(()) => ExitCode::SUCCESS,
        Err(HostError::Usage(message)) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!(error = %err, "host_failed");
            ExitCode::from(1)
        }
    }
}

fn run_host() -> Result<(), HostError> {
    let args = parse_args(env::args().skip(1))?.resolve_env();
    if args.help {
        println!("{}", usage_text());
        return Ok(());
    }

    let sim_config = load_sim_config(&args)?;
    let profiles = load_profiles(&args)?;
    let mut host_config = HostConfig::default();
    args.apply_to(&mut host_config);

    let sim = Simulation::new(sim_config, profiles)?;
    let mut runner = StageRunner::new(host_config, sim)?;
    let summary = runner.run();

    if let Some(path) = &args.dump_path {
        StageDump::capture(runner.simulation(), runner.stage(), summary).write(path)?;
        info!(path = %path.display(), pets = summary.pets, "stage_dump_written");
    }
    Ok(())
}

fn load_sim_config(args: &HostArgs) -> Result<SimConfig, HostError> {
    let mut config = match &args.config_path {
        Some(path) => {
            let config = SimConfig::load(path)?;
            info!(path = %path.display(), "sim_config_loaded");
            config
        }
        None => SimConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

fn load_profiles(args: &HostArgs) -> Result<ProfileTable, HostError> {
    let mut profiles = ProfileTable::builtin();
    if let Some(dir) = &args.profiles_dir {
        let loaded = load_profile_defs(dir, &mut profiles)?;
        info!(dir = %dir.display(), loaded, total = profiles.len(), "profiles_ready");
    }
    Ok(profiles)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
