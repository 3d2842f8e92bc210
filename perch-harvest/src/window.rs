use chrono::{DateTime, Months, Utc};

/// The trailing time window a harvest run collects.
///
/// The cutoff is inclusive: a tweet created exactly at `cutoff` is inside.
/// Timestamps newer than `now` (clock skew) are inside too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub now: DateTime<Utc>,
    pub cutoff: DateTime<Utc>,
}

impl Window {
    /// Window covering `months` calendar months back from `now`.
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use perch_harvest::Window;
    ///
    /// let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    /// let w = Window::trailing_months(now, 24);
    /// assert_eq!(w.cutoff, Utc.with_ymd_and_hms(2024, 10, 19, 12, 0, 0).unwrap());
    /// assert!(w.contains(w.cutoff));
    /// ```
    pub fn trailing_months(now: DateTime<Utc>, months: u32) -> Self {
        let cutoff = now
            .checked_sub_months(Months::new(months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { now, cutoff }
    }

    pub fn contains(&self, created_at: DateTime<Utc>) -> bool {
        created_at >= self.cutoff
    }

    /// True when a collection whose oldest tweet is `oldest` already
    /// reaches back to the cutoff.
    pub fn is_covered_by(&self, oldest: DateTime<Utc>) -> bool {
        oldest <= self.cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn month_end_clamps() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        let w = Window::trailing_months(now, 1);
        assert_eq!(w.cutoff, Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        let w = Window::trailing_months(now, 24);
        let just_before = w.cutoff - Duration::seconds(1);
        let just_after = w.cutoff + Duration::seconds(1);

        assert!(w.contains(w.cutoff));
        assert!(!w.contains(just_before));
        assert!(w.is_covered_by(w.cutoff));
        assert!(w.is_covered_by(just_before));
        assert!(!w.is_covered_by(just_after));
    }
}
