use serde::Deserialize;
use std::env;

/// Tuning knobs for one engine instance. Values come from `config/*.toml`
/// plus `APP__`-prefixed environment overrides; every knob also has a plain
/// env fallback so a kiosk deployment can be adjusted without a config file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Countdown resolution. The logical decrement per tick is always
    /// 1000 ms regardless of this value, so tests can run a fast clock.
    pub tick_interval_ms: u64,
    pub autosave_interval_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub inactivity_poll_ms: u64,
    pub submit_max_attempts: usize,
    /// Regex patterns matched against the host signature; any hit classifies
    /// the environment as a locked kiosk browser.
    pub locked_signatures: Vec<String>,
    pub assessment_api_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            autosave_interval_ms: 30_000,
            inactivity_timeout_ms: 30_000,
            inactivity_poll_ms: 5_000,
            submit_max_attempts: 3,
            locked_signatures: vec!["SEB/".to_string(), "SafeExamBrowser".to_string()],
            assessment_api_url: "http://localhost:8080".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env_name)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = EngineConfig::default();

        let tick_interval_ms = Self::u64_knob(
            &settings,
            "engine.tick_interval_ms",
            "EXAM_TICK_INTERVAL_MS",
            defaults.tick_interval_ms,
        );
        let autosave_interval_ms = Self::u64_knob(
            &settings,
            "engine.autosave_interval_ms",
            "EXAM_AUTOSAVE_INTERVAL_MS",
            defaults.autosave_interval_ms,
        );
        let inactivity_timeout_ms = Self::u64_knob(
            &settings,
            "engine.inactivity_timeout_ms",
            "EXAM_INACTIVITY_TIMEOUT_MS",
            defaults.inactivity_timeout_ms,
        );
        let inactivity_poll_ms = Self::u64_knob(
            &settings,
            "engine.inactivity_poll_ms",
            "EXAM_INACTIVITY_POLL_MS",
            defaults.inactivity_poll_ms,
        );
        let submit_max_attempts = Self::u64_knob(
            &settings,
            "engine.submit_max_attempts",
            "EXAM_SUBMIT_MAX_ATTEMPTS",
            defaults.submit_max_attempts as u64,
        )
        .max(1) as usize;

        let locked_signatures = settings
            .get_array("engine.locked_signatures")
            .ok()
            .map(|values| {
                values
                    .into_iter()
                    .filter_map(|v| v.into_string().ok())
                    .collect::<Vec<_>>()
            })
            .or_else(|| {
                env::var("EXAM_LOCKED_SIGNATURES")
                    .ok()
                    .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
            })
            .filter(|sigs: &Vec<String>| !sigs.is_empty())
            .unwrap_or(defaults.locked_signatures);

        let assessment_api_url = settings
            .get_string("engine.assessment_api_url")
            .or_else(|_| env::var("ASSESSMENT_API_URL"))
            .unwrap_or(defaults.assessment_api_url);

        Ok(EngineConfig {
            tick_interval_ms,
            autosave_interval_ms,
            inactivity_timeout_ms,
            inactivity_poll_ms,
            submit_max_attempts,
            locked_signatures,
            assessment_api_url,
        })
    }

    fn u64_knob(settings: &config::Config, key: &str, env_key: &str, default: u64) -> u64 {
        settings
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .or_else(|| env::var(env_key).ok().and_then(|v| v.parse::<u64>().ok()))
            .filter(|v| *v > 0)
            .unwrap_or(default)
    }
}
