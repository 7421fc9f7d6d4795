use std::time::Duration;

use magi_hardware::{SimParams, ThermalSim};
use magi_traits::{Channel, Heater, Sensor};
use rstest::rstest;

fn sim(time_scale: f64) -> ThermalSim {
    ThermalSim::new(SimParams {
        time_scale,
        ..SimParams::default()
    })
}

#[rstest]
#[case(Channel::Baseline)]
#[case(Channel::Bottom)]
#[case(Channel::Top)]
fn readings_stay_in_adc_range(#[case] channel: Channel) {
    let sim = sim(1.0);
    let mut sensor = sim.sensor();
    let v = sensor
        .read_channel(channel, Duration::from_millis(5))
        .expect("sim read");
    assert!((0.0..=1.0).contains(&v), "{channel:?} -> {v}");
}

#[test]
fn top_reads_below_bottom_when_hot() {
    let sim = sim(500.0);
    let mut heater = sim.heater();
    let mut sensor = sim.sensor();
    heater.set_duty_cycle(50.0).unwrap();
    std::thread::sleep(Duration::from_millis(40));
    let t = Duration::from_millis(5);
    let bottom = sensor.read_channel(Channel::Bottom, t).unwrap();
    let top = sensor.read_channel(Channel::Top, t).unwrap();
    assert!(top < bottom);
}

#[test]
fn plant_cools_back_toward_ambient_with_heater_off() {
    let sim = sim(500.0);
    let mut heater = sim.heater();
    heater.set_duty_cycle(100.0).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    let peak = sim.temperature_c();
    heater.set_duty_cycle(0.0).unwrap();
    heater.set_auxiliary(true).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(sim.temperature_c() < peak);
}
