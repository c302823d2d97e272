//! Sport-family metrics derived from boxscores
//!
//! Every function takes the last-10 window newest first. Each entry's
//! boxscore is read together with that same entry's score-for/against.

use std::collections::BTreeMap;

use super::boxscore::{BaseballBox, BasketballBox, GridironBox, HockeyBox};
use super::rolling::{ewma, GameEntry};
use crate::StatFamily;

pub const BASKETBALL_METRICS: &[&str] = &[
    "efg_pct_10",
    "tov_pct_10",
    "ftr_10",
    "oreb_pct_10",
    "net_rating_10",
    "ast_tov_ratio",
    "pace_10",
];

pub const HOCKEY_METRICS: &[&str] = &[
    "shots_per_game_10",
    "save_pct_10",
    "goals_per_game_10",
    "goals_against_10",
    "shot_diff_10",
    "pp_pct_10",
    "pk_pct_10",
];

pub const BASEBALL_METRICS: &[&str] = &[
    "ops_10",
    "era_10",
    "whip_10",
    "k_bb_ratio_10",
    "batting_avg_10",
    "slug_pct_10",
    "runs_per_game_10",
];

pub const GRIDIRON_METRICS: &[&str] = &["yards_per_play_10", "tov_margin_10", "third_down_pct_10"];

/// Metric names a family always produces
pub fn metric_names(family: StatFamily) -> &'static [&'static str] {
    match family {
        StatFamily::Basketball => BASKETBALL_METRICS,
        StatFamily::Hockey => HOCKEY_METRICS,
        StatFamily::Baseball => BASEBALL_METRICS,
        StatFamily::Gridiron => GRIDIRON_METRICS,
    }
}

/// Family metrics for a window; `season` holds the current season's prior
/// entries for the season-cumulative ratios
pub fn family_metrics(
    family: StatFamily,
    window: &[&GameEntry],
    season: &[&GameEntry],
) -> BTreeMap<String, f64> {
    let values = if window.iter().all(|e| e.boxscore.is_none()) {
        vec![0.0; metric_names(family).len()]
    } else {
        match family {
            StatFamily::Basketball => basketball(window, season),
            StatFamily::Hockey => hockey(window),
            StatFamily::Baseball => baseball(window),
            StatFamily::Gridiron => gridiron(window),
        }
    };

    let mut metrics: BTreeMap<String, f64> = metric_names(family)
        .iter()
        .zip(values)
        .map(|(name, value)| (name.to_string(), value))
        .collect();

    // Season-scoped, so it stands even when the window itself has no boxscores
    if family == StatFamily::Basketball {
        metrics.insert("ast_tov_ratio".to_string(), assist_turnover_ratio(season));
    }
    metrics
}

fn with_box<'a, T: 'a>(
    entries: &'a [&'a GameEntry],
    pick: impl Fn(&'a GameEntry) -> Option<&'a T> + 'a,
) -> impl Iterator<Item = (&'a GameEntry, &'a T)> + 'a {
    entries.iter().filter_map(move |&e| pick(e).map(|b| (e, b)))
}

fn basketball_box(entry: &GameEntry) -> Option<&BasketballBox> {
    entry.boxscore.as_ref().and_then(|b| b.as_basketball())
}

fn hockey_box(entry: &GameEntry) -> Option<&HockeyBox> {
    entry.boxscore.as_ref().and_then(|b| b.as_hockey())
}

fn baseball_box(entry: &GameEntry) -> Option<&BaseballBox> {
    entry.boxscore.as_ref().and_then(|b| b.as_baseball())
}

fn gridiron_box(entry: &GameEntry) -> Option<&GridironBox> {
    entry.boxscore.as_ref().and_then(|b| b.as_gridiron())
}

fn basketball(window: &[&GameEntry], season: &[&GameEntry]) -> Vec<f64> {
    let mut efg = Vec::new();
    let mut tov_pct = Vec::new();
    let mut ftr = Vec::new();
    let mut oreb_pct = Vec::new();
    let mut pace = Vec::new();

    for (_, b) in with_box(window, basketball_box) {
        let fga = if b.fga > 0.0 { b.fga } else { 1.0 };
        efg.push((b.fgm + 0.5 * b.fg3m) / fga);
        tov_pct.push(b.tov / (fga + 0.44 * b.fta + b.tov));
        ftr.push(b.fta / fga);

        let boards = b.oreb + b.dreb;
        oreb_pct.push(if boards > 0.0 {
            b.oreb / boards
        } else if b.reb > 0.0 {
            b.oreb / b.reb
        } else {
            0.0
        });

        pace.push(b.fga + 0.44 * b.fta - b.oreb + b.tov);
    }

    // Actual scoring margin over every window game, boxscore or not
    let margins: Vec<f64> = window.iter().map(|e| e.margin).collect();

    vec![
        ewma(&efg),
        ewma(&tov_pct),
        ewma(&ftr),
        ewma(&oreb_pct),
        ewma(&margins),
        assist_turnover_ratio(season),
        ewma(&pace),
    ]
}

fn assist_turnover_ratio(season: &[&GameEntry]) -> f64 {
    let (ast, tov) = with_box(season, basketball_box)
        .fold((0.0, 0.0), |(ast, tov), (_, b)| (ast + b.ast, tov + b.tov));
    ast / tov.max(1.0)
}

fn hockey(window: &[&GameEntry]) -> Vec<f64> {
    let mut shots = Vec::new();
    let mut save_pct = Vec::new();
    let mut goals = Vec::new();
    let mut shots_against = Vec::new();
    let (mut pp_goals, mut pp_opp) = (0.0, 0.0);
    let (mut pk_goals_against, mut pk_opp) = (0.0, 0.0);

    for (entry, b) in with_box(window, hockey_box) {
        shots.push(b.shots);
        save_pct.push(b.save_pct);
        goals.push(b.goals);
        shots_against.push(b.saves + entry.score_against);
        pp_goals += b.pp_goals;
        pp_opp += b.pp_opportunities;

        match (b.opp_pp_goals, b.opp_pp_opportunities) {
            (Some(goals_against), Some(opportunities)) => {
                pk_goals_against += goals_against;
                pk_opp += opportunities;
            }
            _ => {
                pk_goals_against += b.pk_goals_against;
                pk_opp += b.pk_opportunities;
            }
        }
    }

    let goals_against: Vec<f64> = window.iter().map(|e| e.score_against).collect();

    vec![
        ewma(&shots),
        ewma(&save_pct),
        ewma(&goals),
        ewma(&goals_against),
        ewma(&shots) - ewma(&shots_against),
        pp_goals / pp_opp.max(1.0),
        1.0 - pk_goals_against / pk_opp.max(1.0),
    ]
}

fn baseball(window: &[&GameEntry]) -> Vec<f64> {
    let (mut hits, mut at_bats, mut walks, mut bases) = (0.0, 0.0, 0.0, 0.0);
    let (mut strikeouts, mut pitching_walks) = (0.0, 0.0);
    let mut whip = Vec::new();
    let mut era = Vec::new();

    for (entry, b) in with_box(window, baseball_box) {
        hits += b.hits;
        at_bats += b.at_bats;
        walks += b.walks;
        bases += b.bases();
        strikeouts += b.pitching_strikeouts;
        pitching_walks += b.pitching_walks;

        if b.team_whip != 0.0 {
            whip.push(b.team_whip);
        }

        if b.team_ip > 0.0 {
            let runs = b.earned_runs.unwrap_or(entry.score_against);
            era.push(runs / b.team_ip * 9.0);
        } else if b.pitcher_ip > 0.0 {
            era.push(entry.score_against / b.pitcher_ip * 9.0);
        }
    }

    if at_bats == 0.0 {
        at_bats = 1.0;
    }
    let obp = (hits + walks) / (at_bats + walks);
    let slugging = bases / at_bats;
    let runs: Vec<f64> = window.iter().map(|e| e.score_for).collect();

    vec![
        obp + slugging,
        ewma(&era),
        ewma(&whip),
        strikeouts / pitching_walks.max(1.0),
        hits / at_bats,
        slugging,
        ewma(&runs),
    ]
}

fn gridiron(window: &[&GameEntry]) -> Vec<f64> {
    let mut yards_per_play = Vec::new();
    let mut turnover_margin = Vec::new();
    let mut third_down = Vec::new();

    for (_, b) in with_box(window, gridiron_box) {
        let plays = b.pass_attempts + b.rushing_carries;
        yards_per_play.push(if plays > 0.0 { b.total_yards / plays } else { 0.0 });

        turnover_margin.push(match b.opp_turnovers {
            Some(opp) => opp - b.turnovers,
            None => -b.turnovers,
        });

        third_down.push(if b.third_down_att > 0.0 {
            b.third_down_conv / b.third_down_att
        } else {
            0.0
        });
    }

    vec![
        ewma(&yards_per_play),
        ewma(&turnover_margin),
        ewma(&third_down),
    ]
}
