//! Daily motion occupancy profile.

use chrono::{NaiveTime, Timelike};

use crate::sample::Sample;

/// Number of 15-minute buckets in a day.
pub const BUCKETS_PER_DAY: usize = 96;

const LOW: char = '\u{2581}';
const HIGH: char = '\u{2588}';

/// 96-bucket occupancy summary of one day's motion samples.
///
/// Bucket `i` covers `[i * 15min, (i + 1) * 15min)`, i.e. index
/// `hour * 4 + minute / 15`. The profile is derived data: it can always be
/// rebuilt from the day's motion samples with [`MotionProfile::from_samples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionProfile {
    buckets: [bool; BUCKETS_PER_DAY],
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionProfile {
    /// An all-unoccupied profile.
    pub const fn new() -> Self {
        Self {
            buckets: [false; BUCKETS_PER_DAY],
        }
    }

    /// Bucket index for a time of day.
    ///
    /// ```
    /// use chrono::NaiveTime;
    /// use huemon_types::MotionProfile;
    ///
    /// let t = NaiveTime::from_hms_opt(14, 59, 0).unwrap();
    /// assert_eq!(MotionProfile::bucket_index(t), 59);
    /// ```
    #[must_use]
    pub fn bucket_index(time: NaiveTime) -> usize {
        (time.hour() as usize) * 4 + (time.minute() as usize) / 15
    }

    /// Build a profile from motion samples. Only active samples
    /// (`motion = true`) mark their bucket.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        let mut profile = Self::new();
        profile.extend(samples);
        profile
    }

    /// Mark the buckets of all active samples.
    pub fn extend<'a>(&mut self, samples: impl IntoIterator<Item = &'a Sample>) {
        for sample in samples {
            if sample.value.is_active() {
                self.mark(sample.timestamp.time());
            }
        }
    }

    /// Mark the bucket containing `time` as occupied.
    pub fn mark(&mut self, time: NaiveTime) {
        self.buckets[Self::bucket_index(time)] = true;
    }

    /// Merge another profile into this one.
    pub fn merge(&mut self, other: &MotionProfile) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *mine |= *theirs;
        }
    }

    #[must_use]
    pub fn is_occupied(&self, index: usize) -> bool {
        self.buckets.get(index).copied().unwrap_or(false)
    }

    /// Indices of occupied buckets, ascending.
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter_map(|(i, occupied)| occupied.then_some(i))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.buckets.iter().any(|b| *b)
    }

    /// Raw bucket view.
    #[must_use]
    pub fn buckets(&self) -> &[bool; BUCKETS_PER_DAY] {
        &self.buckets
    }

    /// Render as a 96-character bar, one block glyph per bucket.
    #[must_use]
    pub fn render(&self) -> String {
        self.buckets
            .iter()
            .map(|occupied| if *occupied { HIGH } else { LOW })
            .collect()
    }

    /// Hour axis aligned with [`render`](Self::render), labelled every 3 hours.
    #[must_use]
    pub fn timeline() -> String {
        let mut axis = String::with_capacity(BUCKETS_PER_DAY + 2);
        for hour in (0..24).step_by(3) {
            axis.push_str(&format!("{:<12}", format!("{:02}", hour)));
        }
        axis.push_str("24");
        axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn motion_at(h: u32, m: u32, active: bool) -> Sample {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap();
        Sample::new(ts, active)
    }

    #[test]
    fn test_profile_marks_expected_buckets() {
        let samples = [
            motion_at(3, 7, true),
            motion_at(3, 10, true),
            motion_at(14, 59, true),
        ];
        let profile = MotionProfile::from_samples(&samples);

        assert_eq!(profile.occupied().collect::<Vec<_>>(), vec![12, 59]);
        for i in 0..BUCKETS_PER_DAY {
            assert_eq!(profile.is_occupied(i), i == 12 || i == 59, "bucket {}", i);
        }
    }

    #[test]
    fn test_inactive_samples_do_not_mark() {
        let samples = [motion_at(8, 0, false), motion_at(9, 30, true)];
        let profile = MotionProfile::from_samples(&samples);
        assert_eq!(profile.occupied().collect::<Vec<_>>(), vec![38]);
    }

    #[test]
    fn test_bucket_edges() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(MotionProfile::bucket_index(t(0, 0)), 0);
        assert_eq!(MotionProfile::bucket_index(t(0, 14)), 0);
        assert_eq!(MotionProfile::bucket_index(t(0, 15)), 1);
        assert_eq!(MotionProfile::bucket_index(t(23, 59)), 95);
    }

    #[test]
    fn test_render_width_and_glyphs() {
        let mut profile = MotionProfile::new();
        profile.mark(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let bar = profile.render();
        assert_eq!(bar.chars().count(), BUCKETS_PER_DAY);
        assert_eq!(bar.chars().next(), Some(HIGH));
        assert!(bar.chars().skip(1).all(|c| c == LOW));
    }

    #[test]
    fn test_timeline_alignment() {
        let axis = MotionProfile::timeline();
        assert!(axis.starts_with("00"));
        assert_eq!(&axis[12..14], "03");
        assert!(axis.ends_with("24"));
        assert_eq!(axis.len(), BUCKETS_PER_DAY + 2);
    }

    #[test]
    fn test_merge() {
        let mut a = MotionProfile::from_samples(&[motion_at(1, 0, true)]);
        let b = MotionProfile::from_samples(&[motion_at(2, 0, true)]);
        a.merge(&b);
        assert_eq!(a.occupied().collect::<Vec<_>>(), vec![4, 8]);
        assert!(!a.is_empty());
        assert!(MotionProfile::default().is_empty());
    }
}

#[cfg(test)]
mod bucket_props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn bucket_index_in_range_and_monotonic(a in 0u32..86_400, b in 0u32..86_400) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo = NaiveTime::from_num_seconds_from_midnight_opt(lo, 0).unwrap();
            let hi = NaiveTime::from_num_seconds_from_midnight_opt(hi, 0).unwrap();
            prop_assert!(MotionProfile::bucket_index(hi) < BUCKETS_PER_DAY);
            prop_assert!(MotionProfile::bucket_index(lo) <= MotionProfile::bucket_index(hi));
        }
    }
}
