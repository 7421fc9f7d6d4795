#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse or yield a config whose validation
// returns; neither step may panic.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = magi_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
