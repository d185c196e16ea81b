//! Deterministic fairness scoring
//!
//! Turns raw bookings and ownership shares into per-member usage statistics
//! and fairness scores. Everything here is pure: identical inputs always
//! produce identical output, so results can be cached and compared freely.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{
    BookingConflict, BookingSample, FairnessLevel, FairnessScore, GroupFairnessResult,
    OwnershipShare, UsageStatistics, UsageStatus,
};

/// Percentage points of fairness lost per point of usage deviation
const DEVIATION_PENALTY: f64 = 2.0;

/// Per-member usage over the given bookings.
///
/// Every booking counts toward the group total; bookings by users without an
/// ownership share do not count toward any member.
pub fn compute_usage_statistics(
    bookings: &[BookingSample],
    shares: &[OwnershipShare],
) -> Vec<UsageStatistics> {
    let total_hours: f64 = bookings.iter().map(BookingSample::duration_hours).sum();

    let mut by_member: HashMap<&str, Vec<&BookingSample>> = HashMap::new();
    for booking in bookings {
        by_member
            .entry(booking.user_id.as_str())
            .or_default()
            .push(booking);
    }

    shares
        .iter()
        .map(|share| {
            let member_bookings = by_member
                .get(share.user_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let member_hours: f64 = member_bookings.iter().map(|b| b.duration_hours()).sum();
            let actual_usage_percentage = if total_hours > 0.0 {
                member_hours / total_hours * 100.0
            } else {
                0.0
            };

            UsageStatistics {
                user_id: share.user_id.clone(),
                ownership_percentage: share.ownership_percentage,
                total_booking_hours: member_hours,
                total_booking_days: distinct_days(member_bookings),
                booking_count: member_bookings.len() as u32,
                actual_usage_percentage,
                usage_deviation: actual_usage_percentage - share.ownership_percentage,
            }
        })
        .collect()
}

/// Scores each member and the group as a whole
pub fn compute_fairness_scores(stats: &[UsageStatistics]) -> GroupFairnessResult {
    let total_hours: f64 = stats.iter().map(|s| s.total_booking_hours).sum();
    let total_bookings: u32 = stats.iter().map(|s| s.booking_count).sum();
    score_members(stats, total_hours, total_bookings)
}

/// Full analysis over raw inputs.
///
/// Unlike [`compute_fairness_scores`], the group totals here include
/// bookings by non-members, matching the denominator used for each
/// member's usage percentage.
pub fn analyze(bookings: &[BookingSample], shares: &[OwnershipShare]) -> GroupFairnessResult {
    let stats = compute_usage_statistics(bookings, shares);
    let total_hours: f64 = bookings.iter().map(BookingSample::duration_hours).sum();
    score_members(&stats, total_hours, bookings.len() as u32)
}

fn score_members(
    stats: &[UsageStatistics],
    total_hours: f64,
    total_bookings: u32,
) -> GroupFairnessResult {
    let members: Vec<FairnessScore> = stats
        .iter()
        .map(|s| FairnessScore {
            stats: s.clone(),
            fairness_score: penalized_score(s.usage_deviation.abs()),
            status: UsageStatus::from_deviation(s.usage_deviation),
            recommended_hours: total_hours * s.ownership_percentage / 100.0,
        })
        .collect();

    let overall_fairness_score = if stats.is_empty() {
        100.0
    } else {
        let mean_abs_deviation =
            stats.iter().map(|s| s.usage_deviation.abs()).sum::<f64>() / stats.len() as f64;
        penalized_score(mean_abs_deviation)
    };

    GroupFairnessResult {
        members,
        overall_fairness_score,
        fairness_level: FairnessLevel::from_score(overall_fairness_score),
        total_hours,
        total_bookings,
    }
}

fn penalized_score(abs_deviation: f64) -> f64 {
    (100.0 - DEVIATION_PENALTY * abs_deviation).clamp(0.0, 100.0)
}

/// Calendar dates touched by at least one booking, counted over merged
/// date spans so long bookings cost nothing extra
fn distinct_days(bookings: &[&BookingSample]) -> u32 {
    let mut spans: Vec<(NaiveDate, NaiveDate)> = bookings
        .iter()
        .filter(|b| b.end_time >= b.start_time)
        .map(|b| (b.start_time.date_naive(), b.end_time.date_naive()))
        .collect();
    spans.sort_unstable();

    let mut days: i64 = 0;
    let mut current: Option<(NaiveDate, NaiveDate)> = None;
    for (start, end) in spans {
        current = match current {
            Some((first, last)) if start <= last => Some((first, last.max(end))),
            Some((first, last)) => {
                days += (last - first).num_days() + 1;
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((first, last)) = current {
        days += (last - first).num_days() + 1;
    }

    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Overlapping bookings between different members, ordered by overlap start
pub fn detect_conflicts(bookings: &[BookingSample]) -> Vec<BookingConflict> {
    let mut sorted: Vec<&BookingSample> = bookings.iter().collect();
    sorted.sort_by_key(|b| b.start_time);

    let mut conflicts = Vec::new();
    for (i, first) in sorted.iter().enumerate() {
        for second in sorted.iter().skip(i + 1) {
            // Sorted by start: nothing further can overlap `first`
            if second.start_time >= first.end_time {
                break;
            }
            if first.user_id == second.user_id {
                continue;
            }

            let overlap_start = second.start_time;
            let overlap_end = first.end_time.min(second.end_time);
            if overlap_end <= overlap_start {
                continue;
            }

            conflicts.push(BookingConflict {
                first_user_id: first.user_id.clone(),
                second_user_id: second.user_id.clone(),
                overlap_start,
                overlap_end,
                overlap_hours: (overlap_end - overlap_start).num_milliseconds() as f64
                    / 3_600_000.0,
            });
        }
    }

    conflicts.sort_by_key(|c| c.overlap_start);
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap()
    }

    fn booking(user: &str, offset_hours: i64, hours: i64) -> BookingSample {
        let start = base() + Duration::hours(offset_hours);
        BookingSample {
            user_id: user.to_string(),
            start_time: start,
            end_time: start + Duration::hours(hours),
        }
    }

    fn share(user: &str, pct: f64) -> OwnershipShare {
        OwnershipShare {
            user_id: user.to_string(),
            ownership_percentage: pct,
        }
    }

    fn stat(user: &str, ownership: f64, hours: f64, total: f64) -> UsageStatistics {
        let actual = if total > 0.0 { hours / total * 100.0 } else { 0.0 };
        UsageStatistics {
            user_id: user.to_string(),
            ownership_percentage: ownership,
            total_booking_hours: hours,
            total_booking_days: 1,
            booking_count: 1,
            actual_usage_percentage: actual,
            usage_deviation: actual - ownership,
        }
    }

    #[test]
    fn test_worked_example_overuse() {
        // 40% owner using 99 of 180 hours
        let bookings = vec![booking("a", 0, 99), booking("b", 200, 81)];
        let shares = vec![share("a", 40.0), share("b", 60.0)];

        let result = analyze(&bookings, &shares);
        let a = &result.members[0];

        assert!((a.stats.actual_usage_percentage - 55.0).abs() < 1e-9);
        assert!((a.stats.usage_deviation - 15.0).abs() < 1e-9);
        assert!((a.fairness_score - 70.0).abs() < 1e-9);
        assert!((a.recommended_hours - 72.0).abs() < 1e-9);
        // 99/180 is not exact in binary; the computed deviation lands just above 15
        assert!(a.stats.usage_deviation > 15.0);
        assert_eq!(a.status, UsageStatus::Overuse);
        assert_eq!(result.total_hours, 180.0);
    }

    #[test]
    fn test_status_at_exact_threshold_is_fair() {
        // 35% owner using exactly half: deviation is exactly +15
        let stats = vec![stat("a", 35.0, 50.0, 100.0), stat("b", 65.0, 50.0, 100.0)];
        let result = compute_fairness_scores(&stats);
        assert_eq!(result.members[0].stats.usage_deviation, 15.0);
        assert_eq!(result.members[0].status, UsageStatus::Fair);
        assert_eq!(result.members[0].fairness_score, 70.0);
        assert_eq!(result.members[1].status, UsageStatus::Fair);

        let above = vec![stat("a", 35.0, 51.0, 100.0)];
        let result = compute_fairness_scores(&above);
        assert_eq!(result.members[0].status, UsageStatus::Overuse);
    }

    #[test]
    fn test_zero_deviation_is_excellent() {
        let bookings = vec![booking("a", 0, 50), booking("b", 60, 30), booking("c", 100, 20)];
        let shares = vec![share("a", 50.0), share("b", 30.0), share("c", 20.0)];

        let result = analyze(&bookings, &shares);

        for member in &result.members {
            assert!((member.fairness_score - 100.0).abs() < 1e-9);
            assert_eq!(member.status, UsageStatus::Fair);
        }
        assert!((result.overall_fairness_score - 100.0).abs() < 1e-9);
        assert_eq!(result.fairness_level, FairnessLevel::Excellent);
    }

    #[test]
    fn test_member_hours_never_exceed_total() {
        let bookings = vec![
            booking("a", 0, 5),
            booking("b", 10, 3),
            booking("outsider", 20, 7),
        ];
        let shares = vec![share("a", 50.0), share("b", 50.0)];

        let stats = compute_usage_statistics(&bookings, &shares);
        let member_sum: f64 = stats.iter().map(|s| s.total_booking_hours).sum();
        let total: f64 = bookings.iter().map(BookingSample::duration_hours).sum();
        assert!(member_sum < total);

        let known_only = &bookings[..2];
        let stats = compute_usage_statistics(known_only, &shares);
        let member_sum: f64 = stats.iter().map(|s| s.total_booking_hours).sum();
        assert_eq!(member_sum, 8.0);
    }

    #[test]
    fn test_outsider_bookings_count_in_group_totals() {
        let bookings = vec![booking("a", 0, 5), booking("outsider", 10, 5)];
        let shares = vec![share("a", 100.0)];

        let result = analyze(&bookings, &shares);
        assert_eq!(result.total_hours, 10.0);
        assert_eq!(result.total_bookings, 2);
        assert!((result.members[0].stats.actual_usage_percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_formulas_hold_for_mixed_group() {
        let bookings = vec![booking("a", 0, 70), booking("b", 80, 20), booking("c", 120, 10)];
        let shares = vec![share("a", 34.0), share("b", 33.0), share("c", 33.0)];

        let result = analyze(&bookings, &shares);

        let mut abs_sum = 0.0;
        for member in &result.members {
            let dev = member.stats.usage_deviation;
            abs_sum += dev.abs();
            let expected = (100.0 - 2.0 * dev.abs()).clamp(0.0, 100.0);
            assert!((member.fairness_score - expected).abs() < 1e-9);

            let expected_status = if dev > 15.0 {
                UsageStatus::Overuse
            } else if dev < -15.0 {
                UsageStatus::Underuse
            } else {
                UsageStatus::Fair
            };
            assert_eq!(member.status, expected_status);
        }

        let expected_overall = (100.0 - 2.0 * abs_sum / 3.0).clamp(0.0, 100.0);
        assert!((result.overall_fairness_score - expected_overall).abs() < 1e-9);
    }

    #[test]
    fn test_scores_clamped_at_zero() {
        let bookings = vec![booking("a", 0, 100)];
        let shares = vec![share("a", 10.0), share("b", 90.0)];

        let result = analyze(&bookings, &shares);
        assert_eq!(result.members[0].fairness_score, 0.0);
        assert_eq!(result.members[1].fairness_score, 0.0);
        assert_eq!(result.members[1].status, UsageStatus::Underuse);
        assert_eq!(result.overall_fairness_score, 0.0);
        assert_eq!(result.fairness_level, FairnessLevel::Poor);
    }

    #[test]
    fn test_no_bookings_is_well_defined() {
        let shares = vec![share("a", 50.0), share("b", 50.0)];
        let result = analyze(&[], &shares);

        for member in &result.members {
            assert_eq!(member.stats.actual_usage_percentage, 0.0);
            assert_eq!(member.stats.usage_deviation, -50.0);
            assert_eq!(member.fairness_score, 0.0);
            assert_eq!(member.recommended_hours, 0.0);
        }
        assert_eq!(result.total_hours, 0.0);
    }

    #[test]
    fn test_no_members_scores_100() {
        let result = analyze(&[], &[]);
        assert!(result.members.is_empty());
        assert_eq!(result.overall_fairness_score, 100.0);
        assert_eq!(result.fairness_level, FairnessLevel::Excellent);
    }

    #[test]
    fn test_deterministic() {
        let bookings = vec![booking("a", 0, 4), booking("b", 5, 9), booking("a", 30, 2)];
        let shares = vec![share("a", 60.0), share("b", 40.0)];

        assert_eq!(analyze(&bookings, &shares), analyze(&bookings, &shares));
        assert_eq!(
            compute_usage_statistics(&bookings, &shares),
            compute_usage_statistics(&bookings, &shares)
        );
    }

    #[test]
    fn test_distinct_days_spans_midnight() {
        // 22:00 to 02:00 next day touches two dates
        let b = booking("a", 14, 4);
        let stats = compute_usage_statistics(&[b], &[share("a", 100.0)]);
        assert_eq!(stats[0].total_booking_days, 2);
        assert_eq!(stats[0].booking_count, 1);
    }

    #[test]
    fn test_distinct_days_merges_overlapping_spans() {
        let bookings = vec![
            booking("a", 0, 30),
            booking("a", 10, 4),
            booking("a", 24 * 5, 1),
        ];
        let stats = compute_usage_statistics(&bookings, &[share("a", 100.0)]);
        // Days 1-2 from the overlapping pair, day 6 on its own
        assert_eq!(stats[0].total_booking_days, 3);
    }

    #[test]
    fn test_booking_ending_at_max_date_does_not_overflow() {
        let end = DateTime::<Utc>::MAX_UTC;
        let booking = BookingSample {
            user_id: "a".to_string(),
            start_time: end - Duration::days(2),
            end_time: end,
        };
        let stats = compute_usage_statistics(&[booking], &[share("a", 100.0)]);
        assert_eq!(stats[0].total_booking_days, 3);
    }

    #[test]
    fn test_multi_year_booking_counts_every_day() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let booking = BookingSample {
            user_id: "a".to_string(),
            start_time: start,
            end_time: start + Duration::days(365 * 4),
        };
        let stats = compute_usage_statistics(&[booking], &[share("a", 100.0)]);
        assert_eq!(stats[0].total_booking_days, 365 * 4 + 1);
    }

    #[test]
    fn test_detect_conflicts_between_members() {
        let bookings = vec![
            booking("a", 0, 4),
            booking("b", 2, 4),
            booking("a", 10, 2),
            booking("a", 11, 2),
        ];

        let conflicts = detect_conflicts(&bookings);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].first_user_id, "a");
        assert_eq!(conflicts[0].second_user_id, "b");
        assert_eq!(conflicts[0].overlap_hours, 2.0);
    }

    #[test]
    fn test_touching_bookings_do_not_conflict() {
        let bookings = vec![booking("a", 0, 2), booking("b", 2, 2)];
        assert!(detect_conflicts(&bookings).is_empty());
    }
}
