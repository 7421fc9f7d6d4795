//! A full assay driven through client actions.

use magi_core::error::MagiError;
use magi_core::mocks::{ScriptedSensor, SpyHeater};
use magi_core::{Instrument, RawSampleStore, Reply, TemperatureController};
use magi_traits::ManualClock;
use serde_json::Value;

const CARD: &str = r#"["setupAssay", {
    "card_filename": "two_wells.json",
    "card_dict": {
        "well_config": [["N gene", "RNase P"]],
        "roi_upper_left": ["10", "20"],
        "roi_width": 8,
        "roi_height": 8,
        "roi_spacing_x": "30",
        "roi_spacing_y": 30
    }
}]"#;

fn instrument(dir: &std::path::Path, heater: SpyHeater) -> Instrument {
    let controller = TemperatureController::builder()
        .with_sensor(ScriptedSensor::constant(0.2, 0.1, 0.1))
        .with_heater(heater)
        .with_clock(ManualClock::new())
        .build()
        .expect("controller");
    let store = RawSampleStore::new(dir.join("data"), "temp_data.csv");
    Instrument::new(controller, store, Some(dir.join("magi.log")))
}

fn text(reply: Reply) -> String {
    match reply {
        Reply::Text(s) => s,
        Reply::Json(v) => panic!("expected text, got {v}"),
    }
}

fn config_error(err: &magi_core::Report) -> bool {
    matches!(err.downcast_ref::<MagiError>(), Some(MagiError::Config(_)))
}

#[test]
fn assay_from_setup_to_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let heater = SpyHeater::default();
    let mut inst = instrument(dir.path(), heater.clone());

    assert_eq!(text(inst.handle_json(r#"["ping", null]"#).unwrap()), "server is ready");
    assert_eq!(
        text(inst.handle_json(CARD).unwrap()),
        "card configuration updated"
    );
    assert_eq!(inst.card_filename(), Some("two_wells.json"));
    let layout = inst.layout().unwrap();
    assert_eq!(layout.well_count(), 2);
    assert_eq!(layout.rois[1].x, 40);
    assert_eq!(layout.targets[1], "RNase P");

    assert_eq!(text(inst.handle_json(r#"["start", null]"#).unwrap()), "PID thread started");
    let again = inst.handle_json(r#"["start", null]"#).unwrap_err();
    assert!(matches!(
        again.downcast_ref::<MagiError>(),
        Some(MagiError::AlreadyRunning)
    ));

    assert_eq!(
        text(inst.handle_json(r#"["setTemperature", "63"]"#).unwrap()),
        "63"
    );
    assert_eq!(inst.controller().desired_temperature(), 63.0);
    let shared = inst.controller().shared_temperature();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while shared.read().updated_at.is_none() {
        assert!(std::time::Instant::now() < deadline, "no temperature published");
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    let t: f64 = text(inst.handle_json(r#"["getTemperature", null]"#).unwrap())
        .parse()
        .unwrap();
    assert!(t > 10.0 && t < 20.0, "{t}");

    // one acquisition every 6 s for 10 minutes, positive from minute 4
    let t0 = 1_700_000_000_i64;
    for i in 0..100 {
        let m = i as f64 * 0.1;
        let signal = 20.0 + 200.0 / (1.0 + (-(m - 5.0) * 3.0).exp());
        inst.record_well_data(t0 + i * 6, &[signal, 18.0]).unwrap();
    }

    let stem = text(inst.handle_json(r#"["endAssay", null]"#).unwrap());
    assert!(!inst.controller().is_running());
    assert_eq!(heater.last_duty(), Some(0.0));
    assert!(dir.path().join("data").join(format!("{stem}.csv")).exists());

    let req = format!(r#"["analyze", {{"filename": "{stem}", "filter_factor": "10", "cut_time": 0, "threshold": "30"}}]"#);
    let Reply::Json(v) = inst.handle_json(&req).unwrap() else {
        panic!("analysis replies with JSON");
    };
    let ttp: Vec<f64> = serde_json::from_value(v["ttp"].clone()).unwrap();
    assert_eq!(ttp.len(), 2);
    assert!(ttp[0] > 3.0 && ttp[0] < 5.0, "{ttp:?}");
    // the flat well is under the threshold
    assert_eq!(ttp[1], magi_core::TTP_NOT_DETECTED);
    assert_eq!(v["y_filt"][0].as_array().unwrap().len(), 100);
    assert!(
        dir.path()
            .join("data")
            .join(format!("{stem}_filt.csv"))
            .exists()
    );
}

#[test]
fn well_data_needs_a_card_and_the_right_width() {
    let dir = tempfile::tempdir().unwrap();
    let mut inst = instrument(dir.path(), SpyHeater::default());

    let err = inst.handle_json(r#"["recordWellData", [1, 2]]"#).unwrap_err();
    assert!(config_error(&err), "{err}");
    let err = inst
        .handle_json(r#"["analyze", {"filename": "nothing"}]"#)
        .unwrap_err();
    assert!(config_error(&err), "{err}");

    inst.handle_json(CARD).unwrap();
    let err = inst.handle_json(r#"["recordWellData", [1, 2, 3]]"#).unwrap_err();
    assert!(err.to_string().contains("expected 2 well values"), "{err}");
    assert_eq!(
        text(inst.handle_json(r#"["recordWellData", ["1.5", 2]]"#).unwrap()),
        "1.5,2"
    );

    assert_eq!(text(inst.handle_json(r#"["onLoad"]"#).unwrap()), "globals cleared");
    assert!(inst.layout().is_none());
}

#[test]
fn end_assay_without_data_still_stops_the_heater() {
    let dir = tempfile::tempdir().unwrap();
    let heater = SpyHeater::default();
    let mut inst = instrument(dir.path(), heater.clone());
    inst.handle_json(r#"["start"]"#).unwrap();
    std::fs::remove_file(dir.path().join("data").join("temp_data.csv")).unwrap();

    let err = inst.handle_json(r#"["endAssay"]"#).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MagiError>(),
        Some(MagiError::Io(_))
    ));
    assert!(!inst.controller().is_running());
    assert_eq!(heater.last_duty(), Some(0.0));
}

#[test]
fn log_can_be_read_and_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("magi.log");
    std::fs::write(&log, "{\"level\":\"INFO\"}\n").unwrap();
    let mut inst = instrument(dir.path(), SpyHeater::default());

    let Reply::Json(Value::String(body)) = inst.handle_json(r#"["getLog"]"#).unwrap() else {
        panic!("log replies with a JSON string");
    };
    assert!(body.starts_with("{\"level\":\"INFO\"}"));
    assert!(body.contains("Log file size: 0.00 MB"), "{body}");

    let Reply::Json(Value::String(msg)) = inst.handle_json(r#"["clearLog"]"#).unwrap() else {
        panic!("clearLog replies with a JSON string");
    };
    assert!(msg.ends_with("cleared"));
    assert_eq!(std::fs::metadata(&log).unwrap().len(), 0);
}
