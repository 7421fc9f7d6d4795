#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(card) = magi_config::load_card_json(data) {
        // accepted cards are rectangular and non-empty
        assert!(card.rows() > 0 && card.cols() > 0);
        assert!(card.well_config.iter().all(|row| row.len() == card.cols()));
    }
});
