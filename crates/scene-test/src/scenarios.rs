//! Canned end-to-end scenarios for the vehicle fixtures
//!
//! Each scenario assumes a runner with [`vehicle_scenes`](crate::vehicle_scenes)
//! registered and the clock at zero.

use crate::Scenario;

/// Battery drains into ECO mode and recovers out of it
pub fn eco_mode_cycle() -> Scenario {
    Scenario::new("eco_mode_cycle")
        .at(0)
        .publish("battery_level", 10)
        .expect_active("eco_mode")
        .at(1000)
        .publish("battery_level", 30)
        .expect_active("eco_mode")
        .at(2000)
        .publish("battery_level", 50)
        .expect_active("eco_mode")
        .at(3000)
        .publish("battery_level", 70)
        .expect_inactive("eco_mode")
        .expect_transitions("eco_mode", 1, 1)
}

/// Sustained speed enters cruise; a dip inside the window does not
pub fn cruise_debounce() -> Scenario {
    Scenario::new("cruise_debounce")
        .at(0)
        .publish("speed", 100)
        .at(3000)
        .expect_inactive("high_speed_cruise")
        .at(6000)
        .expect_active("high_speed_cruise")
        .publish("speed", 67)
        .expect_inactive("high_speed_cruise")
        .at(7000)
        .publish("speed", 60)
        .after(500)
        .publish("speed", 120)
        .after(3000)
        .publish("speed", 50)
        .after(3000)
        .expect_inactive("high_speed_cruise")
        .expect_transitions("high_speed_cruise", 1, 1)
}

/// Brake released before the start click: no match; a fresh press then a
/// click two seconds later matches
pub fn security_start_sequence() -> Scenario {
    Scenario::new("security_start_sequence")
        .at(0)
        .publish("brake_pedal", "pressed")
        .at(1000)
        .publish("brake_pedal", "unpressed")
        .at(2000)
        .publish("start_button", "clicked")
        .expect_inactive("security_start")
        .at(3000)
        .publish("brake_pedal", "pressed")
        .at(5000)
        .publish("start_button", "clicked")
        .expect_active("security_start")
        .expect_transitions("security_start", 1, 0)
}

/// A click after the step timeout is ignored until the brake is pressed again
pub fn security_start_timeout() -> Scenario {
    Scenario::new("security_start_timeout")
        .at(0)
        .publish("brake_pedal", "pressed")
        .at(3500)
        .publish("start_button", "clicked")
        .expect_inactive("security_start")
        .at(3600)
        .publish("brake_pedal", "pressed")
        .at(4000)
        .publish("start_button", "clicked")
        .expect_active("security_start")
}

/// All three scenes driven by one interleaved timeline
pub fn mixed_drive() -> Scenario {
    Scenario::new("mixed_drive")
        .at(0)
        .publish("battery_level", 80)
        .publish("brake_pedal", "pressed")
        .at(1200)
        .publish("start_button", "clicked")
        .expect_active("security_start")
        .at(2000)
        .publish("speed", 95)
        .at(4000)
        .publish("battery_level", 18)
        .expect_active("eco_mode")
        .at(7000)
        .expect_active("high_speed_cruise")
        .at(9000)
        .publish("speed", 40)
        .expect_inactive("high_speed_cruise")
        .expect_active("eco_mode")
        .expect_transitions("high_speed_cruise", 1, 1)
        .expect_transitions("eco_mode", 1, 0)
}

pub fn all_scenarios() -> Vec<Scenario> {
    vec![
        eco_mode_cycle(),
        cruise_debounce(),
        security_start_sequence(),
        security_start_timeout(),
        mixed_drive(),
    ]
}
