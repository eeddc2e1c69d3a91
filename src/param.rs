//! The interactive control: a value in `0..=100` mapped linearly onto a
//! configuration's `paramRange`.

use std::time::Duration;

use serde::Serialize;

use crate::config::{Range, VisualizationConfig};

pub const CONTROL_MIN: f64 = 0.0;
pub const CONTROL_MAX: f64 = 100.0;

/// Tick period of automatic playback.
pub const PLAYBACK_INTERVAL: Duration = Duration::from_millis(50);

/// `range.min` at control 0, `range.max` at control 100. Out-of-range
/// controls are clamped and NaN is treated as 0. A collapsed range pins the
/// result to `range.min`.
pub fn map_control(control: f64, range: Range) -> f64 {
    let control = if control.is_nan() {
        CONTROL_MIN
    } else {
        control.clamp(CONTROL_MIN, CONTROL_MAX)
    };
    if control == CONTROL_MAX {
        return range.max;
    }
    range.min + (control / CONTROL_MAX) * range.span()
}

/// Next control value during playback, wrapping back to the start at 100.
pub fn advance(control: f64) -> f64 {
    let next = (control + 1.0) % CONTROL_MAX;
    if next.is_nan() || next < CONTROL_MIN {
        CONTROL_MIN
    } else {
        next
    }
}

/// Control value after `elapsed` of playback from `control`: one [`advance`]
/// per whole [`PLAYBACK_INTERVAL`].
pub fn advance_by(control: f64, elapsed: Duration) -> f64 {
    let ticks = elapsed.as_nanos() / PLAYBACK_INTERVAL.as_nanos();
    if ticks == 0 {
        return control;
    }
    let ticks = (ticks % CONTROL_MAX as u128) as f64;
    let next = (control + ticks) % CONTROL_MAX;
    if next.is_nan() || next < CONTROL_MIN {
        CONTROL_MIN
    } else {
        next
    }
}

/// What the overlay above a graph shows for the current parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterReadout {
    pub caption: String,
    pub value: f64,
    pub formatted: String,
}

impl ParameterReadout {
    pub fn new(param_label: &str, value: f64) -> Self {
        Self {
            caption: caption(param_label).to_string(),
            value,
            formatted: format!("{value:.1}"),
        }
    }

    pub fn for_control(config: &VisualizationConfig, control: f64) -> Self {
        Self::new(
            &config.param_label,
            map_control(control, config.param_range),
        )
    }
}

/// Labels are written as "<description> <symbol>", e.g. "Limit b"; the
/// caption is the symbol.
fn caption(param_label: &str) -> &str {
    param_label
        .split(' ')
        .nth(1)
        .filter(|word| !word.is_empty())
        .unwrap_or("Parameter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_and_midpoint() {
        let range = Range::new(-3.0, 7.5);
        assert_eq!(map_control(0.0, range), -3.0);
        assert_eq!(map_control(100.0, range), 7.5);
        assert_eq!(map_control(50.0, Range::new(0.0, 10.0)), 5.0);
        assert_eq!(map_control(25.0, Range::new(0.0, 4.0)), 1.0);
    }

    #[test]
    fn reversed_and_collapsed_ranges() {
        assert_eq!(map_control(100.0, Range::new(5.0, 1.0)), 1.0);
        assert_eq!(map_control(50.0, Range::new(5.0, 1.0)), 3.0);
        for control in [0.0, 33.0, 100.0] {
            assert_eq!(map_control(control, Range::new(2.0, 2.0)), 2.0);
        }
    }

    #[test]
    fn out_of_range_controls_are_clamped() {
        let range = Range::new(1.0, 2.0);
        assert_eq!(map_control(-20.0, range), 1.0);
        assert_eq!(map_control(250.0, range), 2.0);
        assert_eq!(map_control(f64::NAN, range), 1.0);
        assert_eq!(map_control(f64::INFINITY, range), 2.0);
    }

    #[test]
    fn playback_wraps() {
        assert_eq!(advance(0.0), 1.0);
        assert_eq!(advance(98.0), 99.0);
        assert_eq!(advance(99.0), 0.0);
        assert_eq!(advance(f64::NAN), 0.0);
    }

    #[test]
    fn playback_ticks_every_interval() {
        assert_eq!(advance_by(0.0, Duration::from_secs(1)), 20.0);
        assert_eq!(advance_by(0.0, Duration::from_secs(5)), 0.0);
        assert_eq!(advance_by(90.0, PLAYBACK_INTERVAL - Duration::from_millis(1)), 90.0);
        assert_eq!(advance_by(90.0, PLAYBACK_INTERVAL * 12), 2.0);
        assert_eq!(advance_by(f64::NAN, PLAYBACK_INTERVAL), 0.0);

        let stepped = (0..37).fold(95.0, |control, _| advance(control));
        assert_eq!(advance_by(95.0, PLAYBACK_INTERVAL * 37), stepped);
    }

    #[test]
    fn readout_caption() {
        assert_eq!(ParameterReadout::new("Limit b", 2.0).caption, "b");
        assert_eq!(ParameterReadout::new("Time t", 2.0).caption, "t");
        assert_eq!(ParameterReadout::new("Speed", 2.0).caption, "Parameter");
        assert_eq!(ParameterReadout::new("", 2.0).caption, "Parameter");
        assert_eq!(ParameterReadout::new("Slope  m", 2.0).caption, "Parameter");
    }

    #[test]
    fn readout_rounds_to_one_decimal() {
        assert_eq!(ParameterReadout::new("Time t", 2.26).formatted, "2.3");
        assert_eq!(ParameterReadout::new("Time t", 3.0).formatted, "3.0");
    }
}
