//! Pure tier classification.
//!
//! Assigns a popularity/freshness tier from a video's view count, age,
//! format, and optional engagement rate. The thresholds are empirically
//! chosen constants and are reproduced exactly; do not re-derive them.

use time::OffsetDateTime;

use crate::domain::types::VideoTier;

const SHORT_VIRAL_VELOCITY: f64 = 50.0;
const SHORT_VIRAL_VIEWS: u64 = 10_000;
const SHORT_POPULAR_VELOCITY: f64 = 20.0;
const SHORT_POPULAR_VIEWS: u64 = 5_000;
const SHORT_TRENDING_MAX_HOURS: f64 = 48.0;
const SHORT_TRENDING_VIEWS: u64 = 1_000;

const HOT_VELOCITY: f64 = 100.0;
const HOT_MAX_HOURS: f64 = 24.0;
const HOT_VIEWS: u64 = 1_000;
const TRENDING_VELOCITY: f64 = 50.0;
const TRENDING_MAX_HOURS: f64 = 72.0;
const TRENDING_VIEWS: u64 = 500;
const RECENT_MAX_HOURS: f64 = 168.0;
const RECENT_VIEWS: u64 = 100;
const EVERGREEN_VIEWS: u64 = 50_000;
const ENGAGEMENT_BOOST_RATE: f64 = 5.0;
const ARCHIVE_MIN_HOURS: f64 = 720.0;

/// Classification inputs. `engagement_rate` is a percentage
/// (likes + comments relative to views) when the caller has it.
#[derive(Debug, Clone, Copy)]
pub struct TierInput {
    pub view_count: u64,
    pub published_at: OffsetDateTime,
    pub is_short: bool,
    pub engagement_rate: Option<f64>,
}

/// Classify relative to the current wall clock.
pub fn classify(input: TierInput) -> VideoTier {
    classify_at(input, OffsetDateTime::now_utc())
}

/// Classify relative to an explicit `now`. Deterministic: identical inputs
/// always produce the identical tier.
pub fn classify_at(input: TierInput, now: OffsetDateTime) -> VideoTier {
    let hours = hours_since_publish(input.published_at, now);
    let velocity = input.view_count as f64 / hours.max(1.0);

    if input.is_short {
        return classify_short(input.view_count, hours, velocity);
    }

    if velocity >= HOT_VELOCITY || (hours < HOT_MAX_HOURS && input.view_count > HOT_VIEWS) {
        return VideoTier::Hot;
    }
    if velocity >= TRENDING_VELOCITY
        || (hours < TRENDING_MAX_HOURS && input.view_count > TRENDING_VIEWS)
    {
        return VideoTier::Trending;
    }
    if hours < RECENT_MAX_HOURS && input.view_count > RECENT_VIEWS {
        return VideoTier::Recent;
    }
    if input.view_count > EVERGREEN_VIEWS {
        return VideoTier::Evergreen;
    }
    if input.engagement_rate.is_some_and(|rate| rate > ENGAGEMENT_BOOST_RATE) {
        return if hours < RECENT_MAX_HOURS {
            VideoTier::Trending
        } else {
            VideoTier::Evergreen
        };
    }
    if hours > ARCHIVE_MIN_HOURS {
        VideoTier::Archive
    } else {
        VideoTier::Standard
    }
}

fn classify_short(view_count: u64, hours: f64, velocity: f64) -> VideoTier {
    if velocity >= SHORT_VIRAL_VELOCITY || view_count > SHORT_VIRAL_VIEWS {
        VideoTier::ViralShort
    } else if velocity >= SHORT_POPULAR_VELOCITY || view_count > SHORT_POPULAR_VIEWS {
        VideoTier::PopularShort
    } else if hours < SHORT_TRENDING_MAX_HOURS || view_count > SHORT_TRENDING_VIEWS {
        VideoTier::Trending
    } else {
        VideoTier::Standard
    }
}

fn hours_since_publish(published_at: OffsetDateTime, now: OffsetDateTime) -> f64 {
    let elapsed = now - published_at;
    (elapsed.whole_seconds() as f64 / 3600.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn input(
        view_count: u64,
        hours_ago: f64,
        is_short: bool,
        engagement_rate: Option<f64>,
    ) -> (TierInput, OffsetDateTime) {
        let now = OffsetDateTime::now_utc();
        let published_at = now - Duration::seconds((hours_ago * 3600.0) as i64);
        (
            TierInput {
                view_count,
                published_at,
                is_short,
                engagement_rate,
            },
            now,
        )
    }

    fn classify_case(
        view_count: u64,
        hours_ago: f64,
        is_short: bool,
        engagement_rate: Option<f64>,
    ) -> VideoTier {
        let (tier_input, now) = input(view_count, hours_ago, is_short, engagement_rate);
        classify_at(tier_input, now)
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let (tier_input, now) = input(1234, 12.0, false, Some(3.0));
        assert_eq!(classify_at(tier_input, now), classify_at(tier_input, now));
    }

    #[test]
    fn viral_short_by_velocity_and_views() {
        // 15000 views at 2h: velocity 7500 and views above 10000
        assert_eq!(classify_case(15_000, 2.0, true, None), VideoTier::ViralShort);
        // velocity alone qualifies
        assert_eq!(classify_case(600, 2.0, true, None), VideoTier::ViralShort);
        // views alone qualify even when old
        assert_eq!(
            classify_case(10_001, 2000.0, true, None),
            VideoTier::ViralShort
        );
    }

    #[test]
    fn popular_short_thresholds() {
        assert_eq!(classify_case(2_100, 100.0, true, None), VideoTier::PopularShort);
        assert_eq!(
            classify_case(5_001, 1000.0, true, None),
            VideoTier::PopularShort
        );
    }

    #[test]
    fn short_trending_by_age_or_views() {
        assert_eq!(classify_case(10, 12.0, true, None), VideoTier::Trending);
        assert_eq!(classify_case(1_001, 500.0, true, None), VideoTier::Trending);
    }

    #[test]
    fn short_standard_fallback() {
        assert_eq!(classify_case(50, 100.0, true, None), VideoTier::Standard);
    }

    #[test]
    fn hot_by_velocity_or_fresh_views() {
        assert_eq!(classify_case(2_000, 12.0, false, None), VideoTier::Hot);
        assert_eq!(classify_case(1_001, 10.0, false, None), VideoTier::Hot);
    }

    #[test]
    fn trending_by_velocity_or_fresh_views() {
        assert_eq!(classify_case(3_500, 60.0, false, None), VideoTier::Trending);
        assert_eq!(classify_case(501, 48.0, false, None), VideoTier::Trending);
    }

    #[test]
    fn recent_within_a_week() {
        assert_eq!(classify_case(150, 140.0, false, None), VideoTier::Recent);
    }

    #[test]
    fn evergreen_by_lifetime_views() {
        assert_eq!(
            classify_case(60_000, 5_000.0, false, None),
            VideoTier::Evergreen
        );
    }

    #[test]
    fn engagement_boost_routes_by_age() {
        // High engagement on a week-old low-view video stays trending
        assert_eq!(
            classify_case(80, 100.0, false, Some(6.0)),
            VideoTier::Trending
        );
        // Same engagement on an older video becomes evergreen
        assert_eq!(
            classify_case(80, 400.0, false, Some(6.0)),
            VideoTier::Evergreen
        );
    }

    #[test]
    fn archive_past_thirty_days() {
        assert_eq!(classify_case(40, 721.0, false, None), VideoTier::Archive);
    }

    #[test]
    fn standard_ten_day_old_low_views() {
        // 240h: too old for recent, too few views for evergreen, no
        // engagement boost, younger than the archive cutoff.
        assert_eq!(classify_case(200, 240.0, false, None), VideoTier::Standard);
    }

    #[test]
    fn velocity_clamps_age_to_one_hour() {
        // Published moments ago: velocity divides by 1h, not by ~0
        assert_eq!(classify_case(60, 0.0, true, None), VideoTier::ViralShort);
    }
}
