use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct ConfigSection {
    hazard_slots: Option<usize>,
    full_scan_batch: Option<usize>,
    reader_backoff_spins: Option<usize>,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
}

struct ResolvedConfig {
    hazard_slots: usize,
    full_scan_batch: usize,
    reader_backoff_spins: usize,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let hazard_slots = cfg.hazard_slots.unwrap_or(3);
    let full_scan_batch = cfg.full_scan_batch.unwrap_or(8);
    let reader_backoff_spins = cfg.reader_backoff_spins.unwrap_or(64);

    assert!(
        (1..=8).contains(&hazard_slots),
        "hazard_slots ({}) must be in 1..=8",
        hazard_slots
    );
    assert!(full_scan_batch > 0, "full_scan_batch must be > 0");
    assert!(
        reader_backoff_spins > 0,
        "reader_backoff_spins must be > 0"
    );

    ResolvedConfig {
        hazard_slots,
        full_scan_batch,
        reader_backoff_spins,
    }
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{}/slabpool.toml", manifest_dir)
}

fn generate_config(cfg: &ResolvedConfig, out_path: &Path) {
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         pub const HAZARD_SLOTS: usize = {};\n\
         pub const FULL_SCAN_BATCH: usize = {};\n\
         pub const READER_BACKOFF_SPINS: usize = {};\n",
        cfg.hazard_slots, cfg.full_scan_batch, cfg.reader_backoff_spins,
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn main() {
    println!("cargo:rerun-if-env-changed=SLABPOOL_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = env::var("SLABPOOL_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={}", config_path);

    // A missing file means all-defaults; the crate must build from a bare
    // checkout. A file that exists but does not parse is an error.
    let config: Config = match fs::read_to_string(&config_path) {
        Ok(content) => toml::from_str(&content).expect("failed to parse TOML config"),
        Err(_) => Config::default(),
    };

    let resolved = resolve_config(&config.config);
    generate_config(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
