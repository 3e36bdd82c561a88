//! Support dump formatting
//!
//! Plain text, one block per subsystem, meant to be pasted into bug reports.

use std::fmt::Write;

use crate::data::ThresholdSet;
use crate::engine::to_celsius;
use crate::monitor::{Sensor, SubsystemRegistry};

/// Format every live subsystem and sensor with thresholds and extrema
pub fn format_dump(platform: &str, registry: &SubsystemRegistry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Support Dump for Platform Temperature Daemon");
    let _ = writeln!(out, "Platform: {}", platform);
    let _ = writeln!(out, "Subsystems: {}", registry.len());

    for subsystem in registry.iter() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Subsystem: {}", subsystem.name());
        let _ = writeln!(
            out,
            "  emergency shutdown: {}",
            if subsystem.emergency_shutdown() { "enabled" } else { "disabled" }
        );
        for sensor in subsystem.sensors() {
            format_sensor(&mut out, sensor);
        }
    }
    out
}

fn format_sensor(out: &mut String, sensor: &Sensor) {
    let _ = writeln!(out, "  Sensor: {}", sensor.name());
    let _ = writeln!(out, "    location:     {}", sensor.location());
    let _ = writeln!(out, "    device:       {}", sensor.device());
    let _ = writeln!(out, "    type:         {}", sensor.sensor_type());
    let _ = writeln!(out, "    status:       {}", sensor.published_status());
    let _ = writeln!(out, "    fan speed:    {}", sensor.fan_speed());
    let _ = writeln!(out, "    temperature:  {}", celsius(sensor.temperature()));
    // extrema stay at their sentinels until the first good reading
    let (min, max) = if sensor.min_observed() > sensor.max_observed() {
        ("n/a".to_string(), "n/a".to_string())
    } else {
        (celsius(sensor.min_observed()), celsius(sensor.max_observed()))
    };
    let _ = writeln!(out, "    min:          {}", min);
    let _ = writeln!(out, "    max:          {}", max);
    let _ = writeln!(out, "    fault count:  {}", sensor.fault_count());
    if let Some(forced) = sensor.test_override() {
        let _ = writeln!(out, "    test override: {}", celsius(forced));
    }
    format_thresholds(out, sensor.thresholds());
}

fn format_thresholds(out: &mut String, t: &ThresholdSet) {
    let a = &t.alarm;
    let _ = writeln!(
        out,
        "    alarm thresholds: emergency {:.2}/{:.2} critical {:.2}/{:.2} max {:.2}/{:.2} min {:.2} low_crit {:.2}",
        a.emergency_on, a.emergency_off, a.critical_on, a.critical_off, a.max_on, a.max_off, a.min, a.low_crit
    );
    let f = &t.fan;
    let _ = writeln!(
        out,
        "    fan thresholds:   max {:.2}/{:.2} fast {:.2}/{:.2} medium {:.2}/{:.2}",
        f.max_on, f.max_off, f.fast_on, f.fast_off, f.medium_on, f.medium_off
    );
}

fn celsius(millidegrees: i32) -> String {
    format!("{:.2} C", to_celsius(millidegrees))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{registry_with, Fixture};

    #[test]
    fn test_dump_lists_every_sensor() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut registry = SubsystemRegistry::new();
        fx.reconciler()
            .apply(&mut registry, &backends, &fx.configs(&["base", "hot"]));

        let dump = format_dump("fake", &registry);
        assert!(dump.starts_with("Support Dump for Platform Temperature Daemon"));
        assert!(dump.contains("Subsystem: base"));
        assert!(dump.contains("Subsystem: hot"));
        assert!(dump.contains("  emergency shutdown: enabled"));
        for name in ["base-1", "base-2", "hot-1", "hot-2"] {
            assert!(dump.contains(&format!("Sensor: {}", name)), "missing {}", name);
        }
        assert!(dump.contains("temperature:  40.00 C"));
        assert!(dump.contains("emergency 95.00/93.00"));
        assert!(dump.contains("medium 66.00/63.00"));
    }

    #[test]
    fn test_unread_sensor_has_no_extrema() {
        use crate::data::SensorDescription;
        use crate::hw::MockSensorHandle;
        use crate::monitor::Subsystem;

        let mut mock = MockSensorHandle::new();
        mock.expect_read_threshold().returning(|_| None);
        let desc = SensorDescription {
            number: 1,
            location: "inlet".into(),
            device: "coretemp:temp1".into(),
            sensor_type: String::new(),
            alarm_thresholds: Default::default(),
            fan_thresholds: Default::default(),
        };
        let mut subsystem = Subsystem::new("cold", false);
        subsystem.add_sensor(Sensor::new("cold", &desc, Box::new(mock)));
        let mut registry = SubsystemRegistry::new();
        registry.insert(subsystem);

        let dump = format_dump("fake", &registry);
        assert!(dump.contains("min:          n/a"));
        assert!(dump.contains("max:          n/a"));
        assert!(!dump.contains("1000.00 C"));
    }

    #[test]
    fn test_dump_shows_observed_extrema() {
        let fx = Fixture::new();
        let backends = registry_with(&fx.hw);
        let mut registry = SubsystemRegistry::new();
        fx.reconciler().apply(&mut registry, &backends, &fx.configs(&["base"]));

        let dump = format_dump("fake", &registry);
        assert!(dump.contains("min:          40.00 C"));
        assert!(dump.contains("max:          40.00 C"));
        assert!(!dump.contains("n/a"));
    }

    #[test]
    fn test_empty_dump() {
        let dump = format_dump("sysfs", &SubsystemRegistry::new());
        assert!(dump.contains("Subsystems: 0"));
        assert!(!dump.contains("Subsystem: "));
    }
}
