use std::path::PathBuf;

/// Runtime configuration. Defaults reproduce the original deployment:
/// form interface on 7860, metrics exposition on 9000, model artifact
/// under `models/`.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub model_path: PathBuf,
    pub http_addr: String,
    pub metrics_addr: String,
    pub metrics_enabled: bool,
    pub decision_threshold: f64,
    pub cors_origin: String,
}

impl ServeConfig {
    pub fn from_env() -> Self {
        let model_path = std::env::var("SURVIVAL_MODEL_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_model_path);

        let http_addr = std::env::var("SURVIVAL_HTTP_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:7860".to_string());

        let metrics_addr = std::env::var("SURVIVAL_METRICS_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:9000".to_string());

        let metrics_enabled =
            parse_bool(std::env::var("SURVIVAL_METRICS_ENABLED").ok().as_deref(), true);

        let decision_threshold = std::env::var("SURVIVAL_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(clamp_threshold)
            .unwrap_or(0.5);

        let cors_origin =
            std::env::var("SURVIVAL_CORS_ORIGIN").unwrap_or_else(|_| "*".to_string());

        ServeConfig {
            model_path,
            http_addr,
            metrics_addr,
            metrics_enabled,
            decision_threshold,
            cors_origin,
        }
    }
}

pub fn default_model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("models")
        .join("survival_model.json")
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    value
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            )
        })
        .unwrap_or(default)
}

fn clamp_threshold(value: f64) -> f64 {
    if !value.is_finite() {
        0.5
    } else if value < 0.01 {
        0.01
    } else if value > 0.99 {
        0.99
    } else {
        value
    }
}
