use plotters::style::RGBColor;

// Anchor points sampled from matplotlib's viridis and coolwarm maps.
const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

const COOLWARM: [(u8, u8, u8); 5] = [
    (59, 76, 192),
    (141, 176, 254),
    (221, 221, 221),
    (244, 154, 123),
    (180, 4, 38),
];

pub const MISSING: RGBColor = RGBColor(200, 200, 200);

/// Sequential colour for `t` in `[0, 1]`.
pub fn sequential(t: f64) -> RGBColor {
    interpolate(&VIRIDIS, t)
}

/// Diverging colour for a correlation in `[-1, 1]`, neutral at zero.
pub fn diverging(value: f64) -> RGBColor {
    if value.is_nan() {
        return MISSING;
    }
    interpolate(&COOLWARM, (value.clamp(-1.0, 1.0) + 1.0) / 2.0)
}

fn interpolate(anchors: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let span = (anchors.len() - 1) as f64;
    let scaled = t * span;
    let lower = (scaled.floor() as usize).min(anchors.len() - 2);
    let frac = scaled - lower as f64;

    let (r0, g0, b0) = anchors[lower];
    let (r1, g1, b1) = anchors[lower + 1];
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    RGBColor(mix(r0, r1), mix(g0, g1), mix(b0, b1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_hits_both_ends() {
        assert_eq!(sequential(0.0), RGBColor(68, 1, 84));
        assert_eq!(sequential(1.0), RGBColor(253, 231, 37));
        assert_eq!(sequential(7.0), RGBColor(253, 231, 37));
    }

    #[test]
    fn diverging_is_neutral_at_zero() {
        assert_eq!(diverging(0.0), RGBColor(221, 221, 221));
        assert_eq!(diverging(-1.0), RGBColor(59, 76, 192));
        assert_eq!(diverging(1.0), RGBColor(180, 4, 38));
        assert_eq!(diverging(f64::NAN), MISSING);
    }
}
