use crate::severity::Severity;
use crate::types::{ChannelMode, Color, Shade};

/// The two interpolation endpoints: `mid` at 50% severity, `high` at 100%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub high: Color,
    pub mid: Color,
}

impl Palette {
    pub fn new(high: Color, mid: Color) -> Self {
        Self { high, mid }
    }

    pub fn shade(&self, severity: Severity, mode: ChannelMode) -> Shade {
        let raw = self.raw_shade(severity);
        match mode {
            ChannelMode::Clamped => raw.clamped(),
            ChannelMode::Unclamped => raw,
        }
    }

    /// Unclamped interpolation, linear in severity and extrapolated outside 50..=100.
    pub fn raw_shade(&self, severity: Severity) -> Shade {
        let distance = severity.distance();
        let [hr, hg, hb] = self.high.channels();
        let [mr, mg, mb] = self.mid.channels();
        Shade::new(
            interpolate_channel(distance, hr, mr),
            interpolate_channel(distance, hg, mg),
            interpolate_channel(distance, hb, mb),
        )
    }
}

fn interpolate_channel(distance: f64, high: f32, mid: f32) -> i32 {
    let value = distance * high as f64 + (1.0 - distance) * mid as f64;
    round_half_up(value)
}

// Halves go toward +inf, so -0.5 becomes 0 and 127.5 becomes 128.
fn round_half_up(value: f64) -> i32 {
    let rounded = (value + 0.5).floor();
    rounded.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yellow_to_red() -> Palette {
        Palette::new(Color::rgb(255.0, 0.0, 0.0), Color::rgb(255.0, 255.0, 0.0))
    }

    #[test]
    fn endpoints_reproduce_reference_colors() {
        let palette = Palette::new(Color::rgb(200.0, 10.0, 30.0), Color::rgb(90.0, 180.0, 60.0));
        assert_eq!(
            palette.shade(Severity::SINK, ChannelMode::Clamped),
            Shade::new(90, 180, 60)
        );
        assert_eq!(
            palette.shade(Severity::UNSANITIZED, ChannelMode::Clamped),
            Shade::new(200, 10, 30)
        );
    }

    #[test]
    fn three_quarter_severity_is_orange() {
        let shade = yellow_to_red().shade(Severity::from_percent(75.0), ChannelMode::Clamped);
        assert_eq!(shade.to_css(), "rgb(255, 128, 0)");
    }

    #[test]
    fn zero_severity_extrapolates_past_mid() {
        let palette = yellow_to_red();
        let severity = Severity::from_percent(0.0);
        assert_eq!(
            palette.shade(severity, ChannelMode::Unclamped),
            Shade::new(255, 510, 0)
        );
        assert_eq!(
            palette.shade(severity, ChannelMode::Clamped),
            Shade::new(255, 255, 0)
        );
    }

    #[test]
    fn above_max_extrapolates_past_high() {
        let shade = yellow_to_red().raw_shade(Severity::from_percent(150.0));
        assert_eq!(shade, Shade::new(255, -255, 0));
        assert!(!shade.in_gamut());
    }

    #[test]
    fn channels_stay_between_endpoints() {
        let palette = Palette::new(Color::rgb(10.0, 240.0, 100.0), Color::rgb(250.0, 20.0, 100.0));
        for step in 51..100 {
            let shade = palette.shade(Severity::from_percent(step as f64), ChannelMode::Clamped);
            assert!((10..=250).contains(&shade.r), "red {} at {step}", shade.r);
            assert!((20..=240).contains(&shade.g), "green {} at {step}", shade.g);
            assert_eq!(shade.b, 100);
        }
    }

    #[test]
    fn evenly_spaced_severities_give_even_steps() {
        let palette = Palette::new(Color::rgb(0.0, 0.0, 0.0), Color::rgb(200.0, 100.0, 40.0));
        let shades: Vec<Shade> = [50.0, 60.0, 70.0, 80.0, 90.0, 100.0]
            .iter()
            .map(|s| palette.shade(Severity::from_percent(*s), ChannelMode::Clamped))
            .collect();
        for pair in shades.windows(2) {
            assert!(((pair[0].r - pair[1].r) - 40).abs() <= 1);
            assert!(((pair[0].g - pair[1].g) - 20).abs() <= 1);
            assert!(((pair[0].b - pair[1].b) - 8).abs() <= 1);
        }
    }

    #[test]
    fn halves_round_toward_positive_infinity() {
        assert_eq!(round_half_up(127.5), 128);
        assert_eq!(round_half_up(-0.5), 0);
        assert_eq!(round_half_up(-1.5), -1);
        assert_eq!(round_half_up(2.4999), 2);
    }
}
