use attribution_engine::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

const VARS: &[&str] = &[
    "ATTRIBUTION_PROFILE",
    "ATTRIBUTION_API_BIND_ADDR",
    "ATTRIBUTION_LOG_LEVEL",
    "ATTRIBUTION_OPERATOR_TOKEN",
    "ATTRIBUTION_OPERATOR_TOKENS",
    "ATTRIBUTION_RUN_EXECUTOR_MAX_CONCURRENT_RUNS",
    "ATTRIBUTION_RUN_EXECUTOR_CONVERSION_CONCURRENCY",
    "ATTRIBUTION_RUN_EXECUTOR_DEFAULT_WINDOW_HOURS",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_only_token_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "ATTRIBUTION_OPERATOR_TOKEN=defaults-token\n");

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.operator_tokens, vec!["defaults-token".to_string()]);
    assert_eq!(cfg.run_executor.max_concurrent_runs, 2);
    assert_eq!(cfg.run_executor.conversion_concurrency, 8);
    assert_eq!(cfg.run_executor.default_window_hours, 72);
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "ATTRIBUTION_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "ATTRIBUTION_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "ATTRIBUTION_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "ATTRIBUTION_PROFILE=test\nATTRIBUTION_API_BIND_ADDR=127.0.0.1:4000\nATTRIBUTION_OPERATOR_TOKEN=layered-token\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "ATTRIBUTION_API_BIND_ADDR=127.0.0.1:3000\nATTRIBUTION_OPERATOR_TOKEN=env-override-token\nATTRIBUTION_RUN_EXECUTOR_CONVERSION_CONCURRENCY=4\n",
    );

    unsafe {
        env::set_var("ATTRIBUTION_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("ATTRIBUTION_RUN_EXECUTOR_CONVERSION_CONCURRENCY", "16");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.run_executor.conversion_concurrency, 16);

    clear_env();
}

#[test]
fn comma_separated_operator_tokens_are_split() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "ATTRIBUTION_OPERATOR_TOKENS=alpha, beta,,gamma\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with token list");
    assert_eq!(cfg.operator_tokens, vec!["alpha", "beta", "gamma"]);

    let redacted = cfg.redacted_json().unwrap();
    assert!(!redacted.contains("alpha"));
    assert!(redacted.contains("[REDACTED]"));
    clear_env();
}

#[test]
fn missing_operator_token_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("operator token is required");
    assert!(format!("{}", err).contains("no operator tokens configured"));
    clear_env();
}

#[test]
fn out_of_range_run_executor_settings_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "ATTRIBUTION_OPERATOR_TOKEN=bounds-token\nATTRIBUTION_RUN_EXECUTOR_MAX_CONCURRENT_RUNS=64\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("max concurrent runs above 32 fails");
    assert!(format!("{}", err).contains("max concurrent runs"));
    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("ATTRIBUTION_API_BIND_ADDR", "not-an-addr");
        env::set_var("ATTRIBUTION_OPERATOR_TOKEN", "bind-token");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}
