//! Per-period score allocation

use chrono::NaiveDate;

use crate::data::GameLog;
use crate::{PeriodSplit, TeamId};

const SHARE_WINDOW: usize = 20;

/// Split `total` across periods by `shares`, in tenths of a point, so the
/// parts sum exactly to `total`.
///
/// Each part is floored first. Missing tenths go to the largest remainders
/// (earlier period wins ties); surplus tenths come off the smallest
/// remainders (later period loses ties).
pub fn largest_remainder(total: u32, shares: &[f64]) -> Vec<f64> {
    if shares.is_empty() {
        return Vec::new();
    }

    let share_sum: f64 = shares.iter().filter(|s| **s > 0.0).sum();
    let normalized: Vec<f64> = if share_sum > 0.0 {
        shares.iter().map(|s| s.max(0.0) / share_sum).collect()
    } else {
        vec![1.0 / shares.len() as f64; shares.len()]
    };

    let target = total as i64 * 10;
    let exact: Vec<f64> = normalized.iter().map(|s| s * target as f64).collect();
    let mut tenths: Vec<i64> = exact.iter().map(|v| v.floor() as i64).collect();
    let remainders: Vec<f64> = exact.iter().zip(&tenths).map(|(v, f)| v - *f as f64).collect();

    let mut by_largest: Vec<usize> = (0..shares.len()).collect();
    by_largest.sort_by(|&a, &b| remainders[b].total_cmp(&remainders[a]).then(a.cmp(&b)));

    let mut diff = target - tenths.iter().sum::<i64>();
    let mut cursor = 0;
    while diff > 0 {
        tenths[by_largest[cursor % by_largest.len()]] += 1;
        diff -= 1;
        cursor += 1;
    }

    let mut by_smallest = by_largest;
    by_smallest.reverse();
    let mut cursor = 0;
    while diff < 0 {
        let idx = by_smallest[cursor % by_smallest.len()];
        if tenths[idx] > 0 {
            tenths[idx] -= 1;
            diff += 1;
        }
        cursor += 1;
    }

    tenths.into_iter().map(|t| t as f64 / 10.0).collect()
}

/// A team's scoring share per period over its recent games before `date`.
///
/// Games without a full set of period scores are ignored; uniform shares
/// are returned when nothing usable remains.
pub fn period_shares(log: &GameLog, team: TeamId, date: NaiveDate, period_count: usize) -> Vec<f64> {
    if period_count == 0 {
        return Vec::new();
    }

    let mut totals = vec![0.0; period_count];
    for game in log.last_n_before(team, date, SHARE_WINDOW) {
        let scores = game.period_scores_for(team);
        if scores.len() < period_count {
            continue;
        }
        for (total, score) in totals.iter_mut().zip(scores) {
            *total += *score as f64;
        }
    }

    let points: f64 = totals.iter().sum();
    if points > 0.0 {
        totals.iter().map(|t| t / points).collect()
    } else {
        vec![1.0 / period_count as f64; period_count]
    }
}

/// Predicted period splits for both teams of a game
pub fn split_scores(
    log: &GameLog,
    home: TeamId,
    away: TeamId,
    date: NaiveDate,
    period_count: usize,
    home_score: u32,
    away_score: u32,
) -> PeriodSplit {
    PeriodSplit {
        home: largest_remainder(home_score, &period_shares(log, home, date, period_count)),
        away: largest_remainder(away_score, &period_shares(log, away, date, period_count)),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::{Game, GameId, GameStatus, Sport};

    fn tenths_sum(parts: &[f64]) -> i64 {
        parts.iter().map(|p| (p * 10.0).round() as i64).sum()
    }

    #[test]
    fn test_exact_shares() {
        let parts = largest_remainder(100, &[0.30, 0.30, 0.20, 0.20]);
        assert_eq!(parts, vec![30.0, 30.0, 20.0, 20.0]);
        assert_relative_eq!(parts.iter().sum::<f64>(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_shortfall_goes_to_earlier_periods_on_ties() {
        let parts = largest_remainder(99, &[0.25; 4]);
        assert_eq!(parts, vec![24.8, 24.8, 24.7, 24.7]);
        assert_relative_eq!(parts.iter().sum::<f64>(), 99.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(largest_remainder(10, &[]).is_empty());
        assert_eq!(largest_remainder(0, &[0.5, 0.5]), vec![0.0, 0.0]);
        assert_eq!(largest_remainder(3, &[0.0, 0.0, 0.0]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_allocation_always_conserves_total() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let total: u32 = rng.gen_range(0..200);
            let periods = rng.gen_range(1..10);
            let shares: Vec<f64> = (0..periods).map(|_| rng.gen_range(0.0..1.0)).collect();

            let parts = largest_remainder(total, &shares);
            assert_eq!(parts.len(), periods);
            assert_eq!(tenths_sum(&parts), total as i64 * 10);
            assert!(parts.iter().all(|p| *p >= 0.0));
        }
    }

    #[test]
    fn test_shares_from_recent_games() {
        let game = |id: i64, day: u32, home_periods: Vec<u32>| Game {
            id: GameId(id),
            sport: Sport::Nhl,
            season: 2024,
            date: NaiveDate::from_ymd_opt(2024, 12, day).unwrap(),
            status: GameStatus::Final,
            home_team: TeamId(1),
            away_team: TeamId(2),
            home_score: Some(home_periods.iter().sum()),
            away_score: Some(0),
            home_period_scores: home_periods,
            away_period_scores: vec![0, 0, 0],
            is_postseason: false,
        };
        let log = GameLog::new(vec![
            game(1, 1, vec![1, 1, 2]),
            game(2, 2, vec![2, 0]),
            game(3, 3, vec![0, 3, 1, 1]),
            game(4, 9, vec![5, 5, 5]),
        ]);
        let date = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();

        // Game 2 lacks a period; game 3's overtime goal is ignored; game 4 is later
        let shares = period_shares(&log, TeamId(1), date, 3);
        assert_relative_eq!(shares[0], 1.0 / 8.0);
        assert_relative_eq!(shares[1], 4.0 / 8.0);
        assert_relative_eq!(shares[2], 3.0 / 8.0);

        // Away side never scored, so it splits evenly
        let split = split_scores(&log, TeamId(1), TeamId(2), date, 3, 4, 3);
        assert_eq!(split.away, vec![1.0, 1.0, 1.0]);
        assert_eq!(split.home, vec![0.5, 2.0, 1.5]);
    }
}
