//! Emissions formulas.
//!
//! Converts transferred bytes, active minutes, device wattage and grid
//! intensity into grams of CO2. Every function here is total: negative or
//! non-finite inputs contribute zero instead of propagating NaN.

mod telemetry;

pub use telemetry::Telemetry;

/// Energy used by networks and data centres per gigabyte transferred.
pub const KWH_PER_GB: f64 = 0.016;

/// Global average grid intensity (gCO2/kWh) used when no regional data exists.
pub const BASELINE_INTENSITY: f64 = 475.0;

/// Average draw of a browsing device when the host gives no override.
pub const DEFAULT_DEVICE_WATTS: f64 = 20.0;

/// Video decoding costs half again its transfer cost.
pub const VIDEO_OVERHEAD_FACTOR: f64 = 0.5;

pub const BYTES_PER_MB: f64 = 1_048_576.0;
const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Intensity and wattage used for a single calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionParams {
    pub intensity: f64,
    pub watts: f64,
}

impl Default for EmissionParams {
    fn default() -> Self {
        Self {
            intensity: BASELINE_INTENSITY,
            watts: DEFAULT_DEVICE_WATTS,
        }
    }
}

impl EmissionParams {
    /// Telemetry overrides win over the grid reading and the configured wattage.
    pub fn resolve(telemetry: &Telemetry, grid_intensity: f64, default_watts: f64) -> Self {
        let intensity = telemetry
            .carbon_intensity
            .filter(|value| value.is_finite() && *value >= 0.0)
            .unwrap_or(grid_intensity);
        let watts = telemetry
            .device_watts
            .filter(|value| value.is_finite() && *value >= 0.0)
            .unwrap_or(default_watts);

        Self { intensity, watts }
    }
}

pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Grams CO2 for moving `bytes` over the network.
pub fn network_carbon(bytes: f64, intensity: f64) -> f64 {
    let bytes = non_negative(bytes);
    if bytes == 0.0 {
        return 0.0;
    }
    round2((bytes / BYTES_PER_GB) * KWH_PER_GB * non_negative(intensity))
}

/// Grams CO2 for keeping a device powered for `active_minutes`.
pub fn device_carbon(active_minutes: f64, watts: f64, intensity: f64) -> f64 {
    let minutes = non_negative(active_minutes);
    if minutes == 0.0 {
        return 0.0;
    }
    round2((minutes / 60.0) * (non_negative(watts) / 1000.0) * non_negative(intensity))
}

/// Extra cost of decoding video, modelled as a share of its network cost.
pub fn video_overhead_carbon(video_bytes: f64, intensity: f64) -> f64 {
    network_carbon(non_negative(video_bytes) * VIDEO_OVERHEAD_FACTOR, intensity)
}

/// Network + device + video decoding overhead for one session.
pub fn total_carbon(telemetry: &Telemetry, params: EmissionParams) -> f64 {
    let network = network_carbon(telemetry.total_bytes(), params.intensity);
    let device = device_carbon(telemetry.time_active, params.watts, params.intensity);
    let video = video_overhead_carbon(telemetry.video_bytes(), params.intensity);
    round2(network + device + video)
}

/// Grams per hour over the active time of the session.
pub fn carbon_rate(telemetry: &Telemetry, params: EmissionParams) -> f64 {
    let minutes = non_negative(telemetry.time_active);
    if minutes == 0.0 {
        return 0.0;
    }
    round2(total_carbon(telemetry, params) / (minutes / 60.0))
}

/// Scales a figure computed at baseline intensity to regional conditions.
pub fn scale_by_grid(baseline_grams: f64, multiplier: Option<f64>) -> f64 {
    match multiplier {
        Some(factor) if factor.is_finite() && factor >= 0.0 => round2(non_negative(baseline_grams) * factor),
        _ => round2(non_negative(baseline_grams)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(total_mb: f64, video_mb: f64, minutes: f64) -> Telemetry {
        Telemetry {
            total_mb,
            video_mb,
            time_active: minutes,
            ..Telemetry::default()
        }
    }

    #[test]
    fn network_carbon_is_zero_for_non_positive_bytes() {
        assert_eq!(network_carbon(0.0, 475.0), 0.0);
        assert_eq!(network_carbon(-10.0, 475.0), 0.0);
        assert_eq!(network_carbon(f64::NAN, 475.0), 0.0);
    }

    #[test]
    fn one_gib_at_baseline() {
        assert_eq!(network_carbon(1_073_741_824.0, 475.0), 7.60);
    }

    #[test]
    fn one_hour_at_twenty_watts() {
        assert_eq!(device_carbon(60.0, 20.0, 475.0), 9.50);
        assert_eq!(device_carbon(0.0, 20.0, 475.0), 0.0);
        assert_eq!(device_carbon(-5.0, 20.0, 475.0), 0.0);
    }

    #[test]
    fn negative_intensity_contributes_nothing() {
        assert_eq!(network_carbon(1_073_741_824.0, -1.0), 0.0);
        assert_eq!(device_carbon(60.0, 20.0, f64::INFINITY), 0.0);
    }

    #[test]
    fn session_without_video() {
        let t = telemetry(500.0, 0.0, 10.0);
        let params = EmissionParams::default();

        assert_eq!(network_carbon(t.total_bytes(), params.intensity), 3.71);
        assert_eq!(device_carbon(t.time_active, params.watts, params.intensity), 1.58);
        assert_eq!(total_carbon(&t, params), 5.29);
    }

    #[test]
    fn video_adds_half_its_network_cost() {
        let t = telemetry(1024.0, 1024.0, 0.0);
        let total = total_carbon(&t, EmissionParams::default());
        assert_eq!(total, 11.40);
    }

    #[test]
    fn rate_is_per_hour() {
        let t = telemetry(0.0, 0.0, 30.0);
        let rate = carbon_rate(&t, EmissionParams::default());
        assert_eq!(rate, 9.5);
        assert_eq!(carbon_rate(&telemetry(100.0, 0.0, 0.0), EmissionParams::default()), 0.0);
    }

    #[test]
    fn overrides_take_priority() {
        let t = Telemetry {
            device_watts: Some(5.0),
            carbon_intensity: Some(100.0),
            ..Telemetry::default()
        };
        let params = EmissionParams::resolve(&t, 300.0, 20.0);
        assert_eq!(params, EmissionParams { intensity: 100.0, watts: 5.0 });

        let ignored = Telemetry {
            device_watts: Some(f64::NAN),
            carbon_intensity: Some(-3.0),
            ..Telemetry::default()
        };
        let params = EmissionParams::resolve(&ignored, 300.0, 20.0);
        assert_eq!(params, EmissionParams { intensity: 300.0, watts: 20.0 });
    }

    #[test]
    fn scaling_by_multiplier() {
        assert_eq!(scale_by_grid(10.0, Some(2.0)), 20.0);
        assert_eq!(scale_by_grid(10.0, None), 10.0);
        assert_eq!(scale_by_grid(-4.0, Some(2.0)), 0.0);
    }
}
