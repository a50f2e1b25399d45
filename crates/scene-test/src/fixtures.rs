//! Vehicle scene fixtures

use scene_core::{Action, Condition, LeafCondition, Scene, SequenceStep};

/// Enter below 20% battery, leave above 60%
pub fn eco_mode() -> Scene {
    Scene::new("eco_mode", "ECO mode")
        .with_enter_conditions([Condition::less_than("battery_level", 20.0)])
        .with_exit_conditions([Condition::greater_than("battery_level", 60.0)])
        .with_enter_actions([Action::new("enable_eco_mode").with_param("mode", "eco")])
        .with_exit_actions([Action::new("disable_eco_mode").with_param("mode", "eco")])
}

/// Speed above 80 held for 5s; leave as soon as speed drops below 70
pub fn high_speed_cruise() -> Scene {
    Scene::new("high_speed_cruise", "High speed cruise")
        .with_enter_conditions([Condition::greater_than("speed", 80.0).debounced(5000)])
        .with_exit_conditions([Condition::less_than("speed", 70.0)])
        .with_enter_actions([Action::new("deploy_spoiler")])
        .with_exit_actions([Action::new("retract_spoiler")])
}

/// Brake pressed, then start clicked within 3s
pub fn security_start() -> Scene {
    Scene::new("security_start", "Security start")
        .with_enter_conditions([Condition::sequence(vec![
            SequenceStep::new(LeafCondition::equals("brake_pedal", "pressed"), 0),
            SequenceStep::new(LeafCondition::equals("start_button", "clicked"), 3000),
        ])])
        .with_enter_actions([Action::new("enable_motor").with_param("power", 100)])
}

pub fn vehicle_scenes() -> Vec<Scene> {
    vec![eco_mode(), high_speed_cruise(), security_start()]
}

/// The vehicle scenes as an external loader would supply them
pub const VEHICLE_SCENES_JSON: &str = r#"[
    {
        "id": "eco_mode",
        "name": "ECO mode",
        "enter_conditions": [{"key": "battery_level", "op": "less_than", "threshold": 20}],
        "exit_conditions": [{"key": "battery_level", "op": "greater_than", "threshold": 60}],
        "enter_actions": [{"name": "enable_eco_mode", "parameters": {"mode": "eco"}}],
        "exit_actions": [{"name": "disable_eco_mode", "parameters": {"mode": "eco"}}]
    },
    {
        "id": "high_speed_cruise",
        "name": "High speed cruise",
        "enter_conditions": [{"key": "speed", "op": "greater_than", "threshold": 80, "duration_ms": 5000}],
        "exit_conditions": [{"key": "speed", "op": "less_than", "threshold": 70}],
        "enter_actions": [{"name": "deploy_spoiler"}],
        "exit_actions": [{"name": "retract_spoiler"}]
    },
    {
        "id": "security_start",
        "name": "Security start",
        "enter_conditions": [{"steps": [
            {"condition": {"key": "brake_pedal", "op": "equals", "expected": "pressed"}, "timeout_ms": 0},
            {"condition": {"key": "start_button", "op": "equals", "expected": "clicked"}, "timeout_ms": 3000}
        ]}],
        "enter_actions": [{"name": "enable_motor", "parameters": {"power": 100}}]
    }
]"#;

/// Parse a JSON array of scene definitions
pub fn scenes_from_json(json: &str) -> Result<Vec<Scene>, serde_json::Error> {
    serde_json::from_str(json)
}
