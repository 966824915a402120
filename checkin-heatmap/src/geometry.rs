use std::fmt;

use serde::Deserialize;

// --------------------------------------------------------------------------
// GeoPoint

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ latitude: {}, longitude: {} }}", self.latitude, self.longitude)
    }
}

impl GeoPoint {
    /// Both coordinates rounded to whole millidegrees, latitude first.
    pub fn to_millidegrees(&self) -> (i64, i64) {
        (round_to_millidegrees(self.latitude), round_to_millidegrees(self.longitude))
    }
}


// --------------------------------------------------------------------------
// BoundingBox

/// Rectangular filter region. Longitudes follow the convention where the
/// `west` bound is numerically larger than the `east` bound.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Default for BoundingBox {
    // Amsterdam, inside the A10 ring
    fn default() -> Self {
        Self {
            north: 52.425,
            south: 52.328,
            east: 4.841,
            west: 4.974,
        }
    }
}

impl BoundingBox {
    /// Strict containment: points lying exactly on an edge are outside.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.south < point.latitude
            && point.latitude < self.north
            && self.east < point.longitude
            && point.longitude < self.west
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N {} S {} E {} W {}", self.north, self.south, self.east, self.west)
    }
}


// --------------------------------------------------------------------------
// Rounding

/// Round `value` to three decimal places with ties going to the even
/// neighbour, and return the result as an integer count of millidegrees.
///
/// Rounding is performed on the exact binary value of the float rather than
/// on `value * 1000.0`, whose product is itself rounded. For example the
/// literal `52.3285` is stored as `52.32849999999999823...`, so it rounds down
/// to 52328, while `0.0625` is an exact tie and rounds to the even 62.
pub fn round_to_millidegrees(value: f64) -> i64 {
    debug_assert!(value.is_finite());
    let bits = value.to_bits();
    let negative = bits >> 63 == 1;
    let biased_exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);

    // value == mantissa * 2^exponent
    let (mantissa, exponent) = if biased_exponent == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased_exponent - 1075)
    };

    let scaled = mantissa as i128 * 1000;
    let magnitude: i128 = if exponent >= 0 {
        // Already an integer; anything this large is nowhere near a coordinate.
        if exponent >= 64 {
            i64::MAX as i128
        } else {
            (scaled << exponent).min(i64::MAX as i128)
        }
    } else {
        let shift = (-exponent) as u32;
        if shift > 64 {
            // scaled < 2^63, so the quotient is zero and the remainder below half
            0
        } else {
            let quotient = scaled >> shift;
            let remainder = scaled - (quotient << shift);
            let half = 1i128 << (shift - 1);
            if remainder > half || (remainder == half && quotient & 1 == 1) {
                quotient + 1
            } else {
                quotient
            }
        }
    };

    let magnitude = magnitude as i64;
    if negative { -magnitude } else { magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_uses_exact_binary_value() {
        // stored just below the tie
        assert_eq!(round_to_millidegrees(52.3285), 52328);
        assert_eq!(round_to_millidegrees(52.37), 52370);
        assert_eq!(round_to_millidegrees(4.9), 4900);
        assert_eq!(round_to_millidegrees(52.425), 52425);
        assert_eq!(round_to_millidegrees(4.841), 4841);
    }

    #[test]
    fn exact_ties_round_to_even() {
        assert_eq!(round_to_millidegrees(0.0625), 62);
        assert_eq!(round_to_millidegrees(0.1875), 188);
        assert_eq!(round_to_millidegrees(-0.0625), -62);
        assert_eq!(round_to_millidegrees(2.5), 2500);
    }

    #[test]
    fn rounding_is_repeatable() {
        let first = round_to_millidegrees(52.3285);
        for _ in 0..10 {
            assert_eq!(round_to_millidegrees(52.3285), first);
        }
    }

    #[test]
    fn rounding_handles_tiny_and_zero_values() {
        assert_eq!(round_to_millidegrees(0.0), 0);
        assert_eq!(round_to_millidegrees(-0.0), 0);
        assert_eq!(round_to_millidegrees(1e-300), 0);
        assert_eq!(round_to_millidegrees(0.0004999), 0);
        assert_eq!(round_to_millidegrees(0.0005001), 1);
    }

    #[test]
    fn edges_are_excluded() {
        let bbox = BoundingBox::default();
        let on_edges = [
            GeoPoint { latitude: bbox.north, longitude: 4.9 },
            GeoPoint { latitude: bbox.south, longitude: 4.9 },
            GeoPoint { latitude: 52.37, longitude: bbox.east },
            GeoPoint { latitude: 52.37, longitude: bbox.west },
        ];
        for point in on_edges {
            assert!(!bbox.contains(&point), "{} should be outside", point);
        }
    }

    #[test]
    fn just_inside_edges_are_included() {
        let bbox = BoundingBox::default();
        let eps = 1e-9;
        let inside = [
            GeoPoint { latitude: bbox.north - eps, longitude: 4.9 },
            GeoPoint { latitude: bbox.south + eps, longitude: 4.9 },
            GeoPoint { latitude: 52.37, longitude: bbox.east + eps },
            GeoPoint { latitude: 52.37, longitude: bbox.west - eps },
        ];
        for point in inside {
            assert!(bbox.contains(&point), "{} should be inside", point);
        }
    }

    #[test]
    fn far_away_points_are_excluded() {
        let bbox = BoundingBox::default();
        assert!(!bbox.contains(&GeoPoint { latitude: 52.3, longitude: 4.9 }));
        assert!(!bbox.contains(&GeoPoint { latitude: 40.7, longitude: -74.0 }));
    }
}
