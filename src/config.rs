use std::path::PathBuf;
use std::str::FromStr;

use crate::bkt::BktParams;

const DEFAULT_PLACEMENT_TEST_LENGTH: usize = 10;
const DEFAULT_FINAL_TEST_LENGTH: usize = 20;
const DEFAULT_FINAL_PASSING_THETA: f64 = 1.0;
const DEFAULT_CODE_MIN_LENGTH: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentConfig {
    pub placement_length: usize,
    pub final_length: usize,
    pub final_passing_theta: f64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            placement_length: DEFAULT_PLACEMENT_TEST_LENGTH,
            final_length: DEFAULT_FINAL_TEST_LENGTH,
            final_passing_theta: DEFAULT_FINAL_PASSING_THETA,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TutorConfig {
    pub bkt: BktParams,
    pub code_min_length: usize,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            bkt: BktParams::default(),
            code_min_length: DEFAULT_CODE_MIN_LENGTH,
        }
    }
}

const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `info,adaptive_tutor=debug`.
    pub level: String,
    /// Daily-rotated file output; stdout only when `None`.
    pub file_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LogConfig,
    pub database_url: Option<String>,
    pub assessment: AssessmentConfig,
    pub tutor: TutorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LogConfig::default(),
            database_url: None,
            assessment: AssessmentConfig::default(),
            tutor: TutorConfig::default(),
        }
    }
}

impl Config {
    /// Reads `.env` if present, then the process environment. Unparseable or
    /// out-of-range values keep their defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let file_logs = parse("ENABLE_FILE_LOGS").is_some_and(|v| v == "true" || v == "1");
        let logging = LogConfig {
            level: parse("RUST_LOG")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.logging.level),
            file_dir: file_logs.then(|| {
                PathBuf::from(
                    parse("LOG_DIR")
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
                )
            }),
        };
        let database_url = parse("DATABASE_URL").filter(|v| !v.is_empty());

        let assessment = AssessmentConfig {
            placement_length: parse_positive(parse("PLACEMENT_TEST_LENGTH"))
                .unwrap_or(defaults.assessment.placement_length),
            final_length: parse_positive(parse("FINAL_TEST_LENGTH"))
                .unwrap_or(defaults.assessment.final_length),
            final_passing_theta: parse_value::<f64>(parse("FINAL_PASSING_THETA"))
                .filter(|v| v.is_finite())
                .unwrap_or(defaults.assessment.final_passing_theta),
        };

        let bkt = BktParams {
            p_transit: parse_probability(parse("BKT_P_TRANSIT")).unwrap_or(defaults.tutor.bkt.p_transit),
            p_guess: parse_probability(parse("BKT_P_GUESS")).unwrap_or(defaults.tutor.bkt.p_guess),
            p_slip: parse_probability(parse("BKT_P_SLIP")).unwrap_or(defaults.tutor.bkt.p_slip),
        };
        let tutor = TutorConfig {
            bkt,
            code_min_length: parse_value::<usize>(parse("CODE_MIN_LENGTH"))
                .unwrap_or(defaults.tutor.code_min_length),
        };

        Self {
            logging,
            database_url,
            assessment,
            tutor,
        }
    }
}

fn parse_value<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|value| value.parse::<T>().ok())
}

fn parse_positive(raw: Option<String>) -> Option<usize> {
    parse_value::<usize>(raw).filter(|&v| v > 0)
}

/// Probabilities must lie strictly inside (0, 1).
fn parse_probability(raw: Option<String>) -> Option<f64> {
    parse_value::<f64>(raw).filter(|&v| v > 0.0 && v < 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.logging, LogConfig::default());
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.assessment, AssessmentConfig::default());
        assert_eq!(cfg.tutor.bkt, BktParams::default());
        assert_eq!(cfg.tutor.code_min_length, 15);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PLACEMENT_TEST_LENGTH", "12"),
            ("FINAL_PASSING_THETA", "0.5"),
            ("BKT_P_SLIP", "0.05"),
            ("DATABASE_URL", "postgres://localhost/tutor"),
        ]);
        assert_eq!(cfg.assessment.placement_length, 12);
        assert_eq!(cfg.assessment.final_passing_theta, 0.5);
        assert_eq!(cfg.tutor.bkt.p_slip, 0.05);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/tutor"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[
            ("FINAL_TEST_LENGTH", "0"),
            ("BKT_P_GUESS", "1.5"),
            ("BKT_P_TRANSIT", "abc"),
            ("FINAL_PASSING_THETA", "NaN"),
        ]);
        assert_eq!(cfg.assessment.final_length, 20);
        assert_eq!(cfg.tutor.bkt.p_guess, 0.20);
        assert_eq!(cfg.tutor.bkt.p_transit, 0.15);
        assert_eq!(cfg.assessment.final_passing_theta, 1.0);
    }

    #[test]
    fn test_file_logging_settings() {
        let off = config(&[("LOG_DIR", "/var/log/tutor")]);
        assert_eq!(off.logging.file_dir, None);

        let default_dir = config(&[("ENABLE_FILE_LOGS", "1"), ("RUST_LOG", "debug")]);
        assert_eq!(default_dir.logging.file_dir, Some(PathBuf::from("./logs")));
        assert_eq!(default_dir.logging.level, "debug");

        let custom = config(&[("ENABLE_FILE_LOGS", "true"), ("LOG_DIR", "/var/log/tutor")]);
        assert_eq!(custom.logging.file_dir, Some(PathBuf::from("/var/log/tutor")));
    }
}
