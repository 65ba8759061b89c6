use crate::config::PipelineConfig;
use crate::domain::ml::FeatureColumn;
use std::env;
use std::sync::Mutex;
use std::sync::OnceLock;

// Global lock to prevent race conditions when modifying environment variables in tests
static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn get_env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

fn set(key: &str, value: &str) {
    // SAFETY: every test touching the environment holds ENV_LOCK.
    unsafe { env::set_var(key, value) };
}

fn clear(keys: &[&str]) {
    for key in keys {
        // SAFETY: every test touching the environment holds ENV_LOCK.
        unsafe { env::remove_var(key) };
    }
}

#[test]
fn test_config_from_env_overrides() {
    let _guard = get_env_lock().lock().unwrap();
    let keys = [
        "SMA_PERIOD",
        "TRAINING_EPOCHS",
        "FEATURE_COLUMNS",
        "MODEL_SEED",
        "GRADIENT_CLIP",
    ];

    set("SMA_PERIOD", "10");
    set("TRAINING_EPOCHS", "12");
    set("FEATURE_COLUMNS", "close, rsi,macd_hist");
    set("MODEL_SEED", "42");
    set("GRADIENT_CLIP", "none");

    let config = PipelineConfig::from_env();
    clear(&keys);
    let config = config.unwrap();

    assert_eq!(config.periods.sma, 10);
    assert_eq!(config.epochs, 12);
    assert_eq!(
        config.features,
        vec![
            FeatureColumn::Close,
            FeatureColumn::Rsi,
            FeatureColumn::MacdHistogram
        ]
    );
    assert_eq!(config.model.seed, Some(42));
    assert_eq!(config.model.gradient_clip, None);
}

#[test]
fn test_config_from_env_defaults() {
    let _guard = get_env_lock().lock().unwrap();
    clear(&[
        "SMA_PERIOD",
        "RSI_PERIOD",
        "TRAINING_EPOCHS",
        "MIN_TRAINING_ROWS",
        "FEATURE_COLUMNS",
        "MODEL_SEED",
        "GRADIENT_CLIP",
    ]);

    let config = PipelineConfig::from_env().unwrap();
    assert_eq!(config, PipelineConfig::default());
}

#[test]
fn test_config_from_env_rejects_garbage() {
    let _guard = get_env_lock().lock().unwrap();
    set("RSI_PERIOD", "fourteen");

    let result = PipelineConfig::from_env();
    clear(&["RSI_PERIOD"]);

    assert!(result.is_err());
}

#[test]
fn test_config_from_env_rejects_invalid_values() {
    let _guard = get_env_lock().lock().unwrap();
    set("MIN_TRAINING_ROWS", "1");

    let result = PipelineConfig::from_env();
    clear(&["MIN_TRAINING_ROWS"]);

    assert!(result.is_err());
}
