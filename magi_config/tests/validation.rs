use magi_config::{load_card_json, load_toml};
use rstest::rstest;

#[test]
fn accepts_full_instrument_config() {
    let toml = r#"
[control]
kp = 12.376
ki = 0.991
kd = 0.0
output_min = 0.0
output_max = 100.0
prefilter_a = 0.999949127
prefilter_b = 0.000050873
prefilter_initial_c = 23.0
setpoint_c = 63.0
bias = 0.82
update_period_ms = 50
publish_period_ms = 100

[hardware]
sensor_read_timeout_ms = 100
pwm_frequency_hz = 5.0

[pins]
heater_pwm = 19
fan = 26

[analysis]
filter_factor = 12.5
cut_time_min = 2.0
threshold = 10

[data]
directory = "/mnt/ramdisk"
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.control.setpoint_c, 63.0);
    assert_eq!(cfg.control.publish_period_ms, 100);
    assert_eq!(cfg.analysis.threshold, 10.0);
    assert_eq!(cfg.data.temp_file, "temp_data.csv");
}

#[rstest]
#[case("[control]\noutput_min = 100.0\noutput_max = 0.0", "output_min must be < control.output_max")]
#[case("[control]\noutput_max = 150.0", "must lie within [0, 100]")]
#[case("[control]\noutput_min = -5.0", "must lie within [0, 100]")]
#[case("[control]\nprefilter_a = 1.0", "prefilter_a must be in")]
#[case("[control]\nprefilter_b = 0.0", "prefilter_b must be in")]
#[case("[control]\nbias = 1.5", "bias must be in")]
#[case("[control]\nupdate_period_ms = 0", "update_period_ms must be >= 1")]
#[case("[control]\nupdate_period_ms = 100\npublish_period_ms = 50", "publish_period_ms must be >=")]
#[case("[hardware]\nsensor_read_timeout_ms = 0", "sensor_read_timeout_ms must be >= 1")]
#[case("[hardware]\npwm_frequency_hz = 0.0", "pwm_frequency_hz must be > 0")]
#[case("[analysis]\nfilter_factor = 0.5", "filter_factor must be >= 1")]
#[case("[analysis]\ncut_time_min = -1.0", "cut_time_min must be >= 0")]
#[case("[analysis]\nthreshold = -3.0", "threshold must be >= 0")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation must be one of")]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains(needle), "{err} !~ {needle}");
}

#[test]
fn rejects_wrong_calibration_length() {
    let err = load_toml("[control]\ncalibration = [1.0, 2.0]").expect_err("short array");
    assert!(!err.to_string().is_empty());
}

#[rstest]
#[case(r#"{"well_config": []}"#, "at least one row")]
#[case(r#"{"well_config": [[]]}"#, "at least one column")]
#[case(r#"{"well_config": [["a", "b"], ["c"]]}"#, "row 1 has 1 columns")]
#[case(r#"{"well_config": [["a"]], "roi_width": -2}"#, "must be >= 0")]
#[case(r#"{"well_config": [["a"]], "roi_upper_left": [1]}"#, "invalid card JSON")]
fn rejects_bad_cards(#[case] json: &str, #[case] needle: &str) {
    let err = load_card_json(json).expect_err("should reject");
    assert!(format!("{err}").contains(needle), "{err} !~ {needle}");
}

#[test]
fn config_and_card_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("magi.toml");
    std::fs::write(
        &cfg_path,
        "[data]\ndirectory = \"/mnt/ramdisk\"\n\n[logging]\nfile = \"magi.log\"\nrotation = \"daily\"\n",
    )
    .unwrap();
    let cfg = load_toml(&std::fs::read_to_string(&cfg_path).unwrap()).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.data.directory, std::path::Path::new("/mnt/ramdisk"));
    assert_eq!(cfg.data.temp_file, "temp_data.csv");
    assert_eq!(cfg.logging.rotation.as_deref(), Some("daily"));

    let card_path = dir.path().join("card.json");
    std::fs::write(&card_path, r#"{"well_config": [["a", "b", "c"], ["d", "e", 7]]}"#).unwrap();
    let card = load_card_json(&std::fs::read_to_string(&card_path).unwrap()).unwrap();
    assert_eq!((card.rows(), card.cols()), (2, 3));
    assert_eq!(card.well_config[1][2], "7");
    assert_eq!(card.roi_upper_left, (0, 0));
}
