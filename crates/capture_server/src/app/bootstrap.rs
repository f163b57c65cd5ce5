use capture_core::LoopConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::cli::CliOptions;
use super::scenario::{load_scenario, Scenario, ScenarioError};

const TPS_ENV_VAR: &str = "CAPTURE_TPS";
const PUBLISH_HZ_ENV_VAR: &str = "CAPTURE_PUBLISH_HZ";
const DEFAULT_TPS: u32 = 60;
pub(crate) const DEFAULT_PUBLISH_HZ: u32 = 10;

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) publish_hz: u32,
    pub(crate) scenario: Scenario,
    pub(crate) options: CliOptions,
}

pub(crate) fn build_app(options: CliOptions) -> Result<AppWiring, ScenarioError> {
    init_tracing();
    info!("=== Capture Server Startup ===");

    let target_tps = parse_rate_or_default(
        TPS_ENV_VAR,
        std::env::var(TPS_ENV_VAR).ok().as_deref(),
        DEFAULT_TPS,
    );
    let publish_hz = parse_rate_or_default(
        PUBLISH_HZ_ENV_VAR,
        std::env::var(PUBLISH_HZ_ENV_VAR).ok().as_deref(),
        DEFAULT_PUBLISH_HZ,
    );
    let loop_config = LoopConfig {
        target_tps,
        ..LoopConfig::default()
    };

    let scenario = load_scenario(&options.scenario_path)?;
    info!(
        scenario = %scenario.name,
        path = %options.scenario_path.display(),
        zones = scenario.zones.len(),
        agents = scenario.agents.len(),
        duration_seconds = scenario.duration_seconds,
        realtime = options.realtime,
        publish_hz,
        "scenario_loaded"
    );

    Ok(AppWiring {
        loop_config,
        publish_hz,
        scenario,
        options,
    })
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

fn parse_rate_or_default(var: &'static str, raw: Option<&str>, default: u32) -> u32 {
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(value) => match value.parse::<u32>() {
            Ok(parsed) if parsed > 0 => parsed,
            _ => {
                warn!(var, value, fallback = default, "invalid_rate_override_using_default");
                default
            }
        },
    }
}
