use std::env;
use std::path::PathBuf;
use std::time::Duration;

use petsim::{ConfigError, ProfileDefError, SimError, Size};
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "PETSIM_CONFIG";
pub const PROFILES_ENV_VAR: &str = "PETSIM_PROFILES_DIR";

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Wall-clock pacing between frames; `None` runs frames back to back.
    pub frame_pacing: Option<Duration>,
    pub run_for: Duration,
    pub container: Size,
    /// Optional mid-run container change, applied once.
    pub resize: Option<(Duration, Size)>,
    pub pet_count: u32,
    pub pet_kinds: Vec<String>,
    /// Sprite size before the profile's scale is applied.
    pub sprite_size: Size,
    /// Replace the oldest pet this often; exercises mount/unmount churn.
    pub respawn_interval: Option<Duration>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            frame_pacing: Some(Duration::from_millis(16)),
            run_for: Duration::from_secs(10),
            container: Size::new(960.0, 540.0),
            resize: None,
            pet_count: 8,
            pet_kinds: ["egg", "cat", "dog", "bird", "default"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            sprite_size: Size::new(64.0, 64.0),
            respawn_interval: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostArgs {
    pub config_path: Option<PathBuf>,
    pub profiles_dir: Option<PathBuf>,
    pub dump_path: Option<PathBuf>,
    pub seed: Option<u64>,
    pub pet_count: Option<u32>,
    pub run_for: Option<Duration>,
    pub headless_fast: bool,
    pub help: bool,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ProfileDefs(#[from] ProfileDefError),
    #[error("failed to mount pet: {0}")]
    Mount(#[from] SimError),
    #[error("failed to write frame dump to {path}: {source}")]
    WriteDump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode frame dump: {0}")]
    EncodeDump(#[source] serde_json::Error),
}

pub fn usage_text() -> String {
    format!(
        "usage: petsim_host [--config <path>] [--profiles <dir>] [--dump <path>] \
[--seed <u64>] [--pets <u32>] [--run-for <seconds>] [--fast]\n\
  --config    simulation config JSON (or {CONFIG_ENV_VAR})\n\
  --profiles  directory of PetProfileDef XML files (or {PROFILES_ENV_VAR})\n\
  --dump      write a JSON stage dump when the run ends\n\
  --fast      do not pace frames against the wall clock"
    )
}

/// Parses command-line flags; env fallbacks are applied by `resolve_env`.
pub fn parse_args<I>(args: I) -> Result<HostArgs, HostError>
where
    I: IntoIterator<Item = String>,
{
    let args = args.into_iter().collect::<Vec<_>>();
    let mut parsed = HostArgs::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => {
                parsed.help = true;
                index += 1;
            }
            "--fast" => {
                parsed.headless_fast = true;
                index += 1;
            }
            "--config" => {
                parsed.config_path = Some(PathBuf::from(flag_value(&args, index)?));
                index += 2;
            }
            "--profiles" => {
                parsed.profiles_dir = Some(PathBuf::from(flag_value(&args, index)?));
                index += 2;
            }
            "--dump" => {
                parsed.dump_path = Some(PathBuf::from(flag_value(&args, index)?));
                index += 2;
            }
            "--seed" => {
                let value = flag_value(&args, index)?;
                parsed.seed = Some(value.parse::<u64>().map_err(|_| {
                    HostError::Usage(format!("invalid --seed value '{value}' (expected u64)"))
                })?);
                index += 2;
            }
            "--pets" => {
                let value = flag_value(&args, index)?;
                parsed.pet_count = Some(value.parse::<u32>().map_err(|_| {
                    HostError::Usage(format!("invalid --pets value '{value}' (expected u32)"))
                })?);
                index += 2;
            }
            "--run-for" => {
                let value = flag_value(&args, index)?;
                let run_for = value
                    .parse::<f32>()
                    .ok()
                    .and_then(|seconds| Duration::try_from_secs_f32(seconds).ok())
                    .ok_or_else(|| {
                        HostError::Usage(format!(
                            "invalid --run-for value '{value}' (expected seconds >= 0)"
                        ))
                    })?;
                parsed.run_for = Some(run_for);
                index += 2;
            }
            other => {
                return Err(HostError::Usage(format!(
                    "unknown argument '{other}'\n{}",
                    usage_text()
                )));
            }
        }
    }
    Ok(parsed)
}

fn flag_value<'a>(args: &'a [String], index: usize) -> Result<&'a str, HostError> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| HostError::Usage(format!("missing value for {}", args[index])))
}

impl HostArgs {
    /// Fills paths not given on the command line from the environment.
    pub fn resolve_env(mut self) -> Self {
        if self.config_path.is_none() {
            self.config_path = env_path(CONFIG_ENV_VAR);
        }
        if self.profiles_dir.is_none() {
            self.profiles_dir = env_path(PROFILES_ENV_VAR);
        }
        self
    }

    pub fn apply_to(&self, config: &mut HostConfig) {
        if let Some(count) = self.pet_count {
            config.pet_count = count;
        }
        if let Some(run_for) = self.run_for {
            config.run_for = run_for;
        }
        if self.headless_fast {
            config.frame_pacing = None;
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
