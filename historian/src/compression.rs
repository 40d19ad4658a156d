//! Deviation-based compression filters for the write path.
//!
//! Each tag with a deviation-based [`CompressionType`](crate::tag::CompressionType)
//! owns one small state machine that spans bucket boundaries. The store feeds
//! every accepted numeric point through the filter and acts on the outcome:
//! the point itself is always inserted (the latest pending candidate stays
//! query-visible), and when the filter proves a previously pending point
//! redundant the store elides it from its bucket and counts the saving.
//!
//! The deviation tolerance is relative: for a configured deviation `d` and an
//! anchor value `a`, the band is `d * max(|a|, 1)`. This keeps the configured
//! [0, 1] deviation meaningful across signals of very different magnitude.
//!
//! # Swinging door
//!
//! The filter maintains the last archived anchor `A` and the tightest pair of
//! "door" slopes compatible with every candidate seen since `A`. Each new
//! point narrows the doors; while they stay open, the line from `A` through
//! the newest candidate predicts every earlier candidate within tolerance, so
//! the earlier candidates are redundant. The doors close precisely when no
//! slope through `A` can keep all candidates in band; the previous candidate
//! is then fixed as the new anchor and fresh doors open through the
//! triggering point.

/// What the filter decided about an offered point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// The point was archived as a new anchor (first point for the tag).
    Archived,
    /// The point is held as the pending candidate. When `elided` is set, the
    /// previously pending point at that timestamp is now provably redundant
    /// and can be removed from storage.
    Held {
        /// Timestamp of a now-redundant pending point, if any.
        elided: Option<i64>,
    },
    /// The point arrived out of order and bypassed the filter entirely.
    Bypassed,
}

/// Swinging-door trending state for one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingingDoor {
    deviation: f64,
    anchor: Option<(i64, f64)>,
    pending: Option<(i64, f64)>,
    upper_slope: f64,
    lower_slope: f64,
}

impl SwingingDoor {
    /// Creates a filter with the given relative deviation in [0, 1].
    pub fn new(deviation: f64) -> Self {
        Self {
            deviation,
            anchor: None,
            pending: None,
            upper_slope: f64::INFINITY,
            lower_slope: f64::NEG_INFINITY,
        }
    }

    fn tolerance(&self, anchor_value: f64) -> f64 {
        self.deviation * anchor_value.abs().max(1.0)
    }

    /// Slopes of the doors opened from `anchor` through a point, bounded by
    /// the tolerance band around the point's value.
    #[allow(clippy::cast_precision_loss)]
    fn door_slopes(&self, anchor: (i64, f64), ts: i64, value: f64) -> (f64, f64) {
        let dt = (ts - anchor.0) as f64;
        let tol = self.tolerance(anchor.1);
        let upper = (value + tol - anchor.1) / dt;
        let lower = (value - tol - anchor.1) / dt;
        (upper, lower)
    }

    /// Offers a point to the filter and returns what to do with it.
    pub fn offer(&mut self, timestamp_ms: i64, value: f64) -> CompressionOutcome {
        let Some(anchor) = self.anchor else {
            self.anchor = Some((timestamp_ms, value));
            return CompressionOutcome::Archived;
        };

        let last_seen = self.pending.map_or(anchor.0, |(ts, _)| ts);
        if timestamp_ms <= last_seen {
            return CompressionOutcome::Bypassed;
        }

        let Some(pending) = self.pending else {
            let (upper, lower) = self.door_slopes(anchor, timestamp_ms, value);
            self.upper_slope = upper;
            self.lower_slope = lower;
            self.pending = Some((timestamp_ms, value));
            return CompressionOutcome::Held { elided: None };
        };

        // Narrow the doors with the new point.
        let (upper, lower) = self.door_slopes(anchor, timestamp_ms, value);
        let narrowed_upper = self.upper_slope.min(upper);
        let narrowed_lower = self.lower_slope.max(lower);

        if narrowed_upper >= narrowed_lower {
            // Doors still open: the line from the anchor through this point
            // predicts the previous candidate within tolerance.
            self.upper_slope = narrowed_upper;
            self.lower_slope = narrowed_lower;
            self.pending = Some((timestamp_ms, value));
            CompressionOutcome::Held {
                elided: Some(pending.0),
            }
        } else {
            // Doors closed: the previous candidate becomes the new anchor and
            // fresh doors open through the triggering point.
            self.anchor = Some(pending);
            let (upper, lower) = self.door_slopes(pending, timestamp_ms, value);
            self.upper_slope = upper;
            self.lower_slope = lower;
            self.pending = Some((timestamp_ms, value));
            CompressionOutcome::Held { elided: None }
        }
    }
}

/// Boxcar deadband state for one tag.
///
/// A point outside the deadband around the last archived value becomes the
/// new anchor. In-band points are held as the pending candidate, with older
/// in-band candidates elided.
#[derive(Debug, Clone, PartialEq)]
pub struct Boxcar {
    deviation: f64,
    anchor: Option<(i64, f64)>,
    pending: Option<(i64, f64)>,
}

impl Boxcar {
    /// Creates a filter with the given relative deviation in [0, 1].
    pub fn new(deviation: f64) -> Self {
        Self {
            deviation,
            anchor: None,
            pending: None,
        }
    }

    /// Offers a point to the filter and returns what to do with it.
    pub fn offer(&mut self, timestamp_ms: i64, value: f64) -> CompressionOutcome {
        let Some(anchor) = self.anchor else {
            self.anchor = Some((timestamp_ms, value));
            return CompressionOutcome::Archived;
        };

        let last_seen = self.pending.map_or(anchor.0, |(ts, _)| ts);
        if timestamp_ms <= last_seen {
            return CompressionOutcome::Bypassed;
        }

        let band = self.deviation * anchor.1.abs().max(1.0);
        if (value - anchor.1).abs() > band {
            self.anchor = Some((timestamp_ms, value));
            self.pending = None;
            return CompressionOutcome::Archived;
        }

        let elided = self.pending.map(|(ts, _)| ts);
        self.pending = Some((timestamp_ms, value));
        CompressionOutcome::Held { elided }
    }
}

/// Per-tag compression state owned by the store's tag index.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionState {
    /// Swinging-door trending.
    SwingingDoor(SwingingDoor),
    /// Boxcar deadband.
    Boxcar(Boxcar),
}

impl CompressionState {
    /// Offers a point to whichever filter this tag carries.
    pub fn offer(&mut self, timestamp_ms: i64, value: f64) -> CompressionOutcome {
        match self {
            Self::SwingingDoor(door) => door.offer(timestamp_ms, value),
            Self::Boxcar(boxcar) => boxcar.offer(timestamp_ms, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_point_is_archived() {
        let mut door = SwingingDoor::new(0.1);
        assert_eq!(door.offer(0, 50.0), CompressionOutcome::Archived);
    }

    #[test]
    fn test_flat_signal_elides_interior_points() {
        let mut door = SwingingDoor::new(0.1);
        assert_eq!(door.offer(0, 10.0), CompressionOutcome::Archived);
        assert_eq!(door.offer(1_000, 10.0), CompressionOutcome::Held { elided: None });
        assert_eq!(
            door.offer(2_000, 10.0),
            CompressionOutcome::Held {
                elided: Some(1_000)
            }
        );
        assert_eq!(
            door.offer(3_000, 10.0),
            CompressionOutcome::Held {
                elided: Some(2_000)
            }
        );
    }

    #[test]
    fn test_linear_ramp_elides_interior_points() {
        // A perfectly linear signal is predicted exactly by interpolation, so
        // only the anchor and the newest candidate survive.
        let mut door = SwingingDoor::new(0.05);
        door.offer(0, 0.0);
        door.offer(1_000, 1.0);
        for i in 2..10 {
            let outcome = door.offer(i * 1_000, f64::from(i as u32));
            assert_eq!(
                outcome,
                CompressionOutcome::Held {
                    elided: Some((i - 1) * 1_000)
                }
            );
        }
    }

    #[test]
    fn test_step_change_closes_doors() {
        let mut door = SwingingDoor::new(0.1);
        door.offer(0, 0.0);
        door.offer(1_000, 0.0);
        // A jump the interpolation line cannot absorb: the previous candidate
        // is fixed as the new anchor, nothing is elided.
        assert_eq!(
            door.offer(2_000, 10.0),
            CompressionOutcome::Held { elided: None }
        );
        // The filter keeps working from the new anchor: the following points
        // lie on a straight line from it, so elision resumes.
        assert_eq!(
            door.offer(3_000, 20.0),
            CompressionOutcome::Held {
                elided: Some(2_000)
            }
        );
        assert_eq!(
            door.offer(4_000, 30.0),
            CompressionOutcome::Held {
                elided: Some(3_000)
            }
        );
    }

    #[test]
    fn test_noise_within_tolerance_is_elided() {
        let mut door = SwingingDoor::new(0.1);
        door.offer(0, 100.0);
        door.offer(1_000, 101.0);
        // 100.5 stays within the +-10 band around the anchor line.
        assert_eq!(
            door.offer(2_000, 100.5),
            CompressionOutcome::Held {
                elided: Some(1_000)
            }
        );
    }

    #[test]
    fn test_out_of_order_point_bypasses_filter() {
        let mut door = SwingingDoor::new(0.1);
        door.offer(5_000, 1.0);
        door.offer(6_000, 2.0);
        assert_eq!(door.offer(5_500, 1.5), CompressionOutcome::Bypassed);
        assert_eq!(door.offer(5_000, 1.0), CompressionOutcome::Bypassed);
    }

    #[test]
    fn test_boxcar_deadband() {
        let mut boxcar = Boxcar::new(0.1);
        assert_eq!(boxcar.offer(0, 100.0), CompressionOutcome::Archived);
        // Within the +-10 band: held, then elided by the next in-band point.
        assert_eq!(
            boxcar.offer(1_000, 105.0),
            CompressionOutcome::Held { elided: None }
        );
        assert_eq!(
            boxcar.offer(2_000, 95.0),
            CompressionOutcome::Held {
                elided: Some(1_000)
            }
        );
        // Outside the band: new anchor.
        assert_eq!(boxcar.offer(3_000, 120.0), CompressionOutcome::Archived);
    }

    #[test]
    fn test_boxcar_small_magnitude_uses_absolute_floor() {
        // Near zero the band floors at deviation * 1.0.
        let mut boxcar = Boxcar::new(0.5);
        boxcar.offer(0, 0.0);
        assert_eq!(
            boxcar.offer(1_000, 0.4),
            CompressionOutcome::Held { elided: None }
        );
        assert_eq!(boxcar.offer(2_000, 0.6), CompressionOutcome::Archived);
    }
}
