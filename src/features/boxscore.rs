//! Typed views over raw boxscore maps
//!
//! Boxscores are stored as open `name -> value` maps. They are interpreted
//! here, once, into the schema of the sport's stat family.

use std::collections::BTreeMap;

use crate::StatFamily;

type RawStats = BTreeMap<String, f64>;

fn stat(raw: &RawStats, key: &str) -> f64 {
    raw.get(key).copied().unwrap_or(0.0)
}

/// First non-zero value among alternative key spellings
fn stat_any(raw: &RawStats, keys: &[&str]) -> f64 {
    keys.iter()
        .map(|k| stat(raw, k))
        .find(|v| *v != 0.0)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasketballBox {
    pub fgm: f64,
    pub fga: f64,
    pub fg3m: f64,
    pub fta: f64,
    pub oreb: f64,
    pub dreb: f64,
    pub reb: f64,
    pub tov: f64,
    pub ast: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HockeyBox {
    pub shots: f64,
    pub saves: f64,
    pub save_pct: f64,
    pub goals: f64,
    pub pp_goals: f64,
    pub pp_opportunities: f64,
    pub pk_goals_against: f64,
    pub pk_opportunities: f64,
    /// Opponent's power play in the same game, when its box is known
    pub opp_pp_goals: Option<f64>,
    pub opp_pp_opportunities: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseballBox {
    pub hits: f64,
    pub at_bats: f64,
    pub walks: f64,
    pub total_bases: f64,
    pub doubles: Option<f64>,
    pub triples: Option<f64>,
    pub home_runs: f64,
    pub pitching_strikeouts: f64,
    pub pitching_walks: f64,
    pub team_whip: f64,
    pub team_ip: f64,
    pub earned_runs: Option<f64>,
    pub pitcher_ip: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridironBox {
    pub total_yards: f64,
    pub pass_attempts: f64,
    pub rushing_carries: f64,
    pub turnovers: f64,
    /// Opponent turnovers in the same game, when its box is known
    pub opp_turnovers: Option<f64>,
    pub third_down_conv: f64,
    pub third_down_att: f64,
}

/// A boxscore interpreted under its family's schema
#[derive(Debug, Clone, PartialEq)]
pub enum BoxscoreStats {
    Basketball(BasketballBox),
    Hockey(HockeyBox),
    Baseball(BaseballBox),
    Gridiron(GridironBox),
}

impl BoxscoreStats {
    /// Interpret a team's raw stats, pulling in the opponent's where the
    /// family derives a metric from both sides of the game
    pub fn from_raw(family: StatFamily, own: &RawStats, opponent: Option<&RawStats>) -> Self {
        match family {
            StatFamily::Basketball => BoxscoreStats::Basketball(BasketballBox {
                fgm: stat(own, "fgm"),
                fga: stat(own, "fga"),
                fg3m: stat_any(own, &["fg3m", "3ptm"]),
                fta: stat(own, "fta"),
                oreb: stat(own, "oreb"),
                dreb: stat(own, "dreb"),
                reb: stat(own, "reb"),
                tov: stat(own, "tov"),
                ast: stat(own, "ast"),
            }),
            StatFamily::Hockey => BoxscoreStats::Hockey(HockeyBox {
                shots: stat(own, "shots"),
                saves: stat(own, "saves"),
                save_pct: stat(own, "save_pct"),
                goals: stat(own, "goals"),
                pp_goals: stat(own, "pp_goals"),
                pp_opportunities: stat(own, "pp_opportunities"),
                pk_goals_against: stat(own, "pk_goals_against"),
                pk_opportunities: stat(own, "pk_opportunities"),
                opp_pp_goals: opponent.map(|o| stat(o, "pp_goals")),
                opp_pp_opportunities: opponent.map(|o| stat(o, "pp_opportunities")),
            }),
            StatFamily::Baseball => BoxscoreStats::Baseball(BaseballBox {
                hits: stat(own, "hits"),
                at_bats: own.get("at_bats").copied().unwrap_or(1.0),
                walks: stat(own, "walks"),
                total_bases: stat(own, "total_bases"),
                doubles: own.get("doubles").copied(),
                triples: own.get("triples").copied(),
                home_runs: stat(own, "home_runs"),
                pitching_strikeouts: stat_any(own, &["pitching_strikeouts", "pitcher_k"]),
                pitching_walks: stat_any(own, &["pitching_walks", "pitcher_bb"]),
                team_whip: stat(own, "team_whip"),
                team_ip: stat(own, "team_ip"),
                earned_runs: own.get("earned_runs").copied(),
                pitcher_ip: stat(own, "pitcher_ip"),
            }),
            StatFamily::Gridiron => BoxscoreStats::Gridiron(GridironBox {
                total_yards: stat(own, "total_yards"),
                pass_attempts: stat(own, "pass_attempts"),
                rushing_carries: stat(own, "rushing_carries"),
                turnovers: stat(own, "turnovers"),
                opp_turnovers: opponent.map(|o| stat(o, "turnovers")),
                third_down_conv: stat(own, "third_down_conv"),
                third_down_att: stat(own, "third_down_att"),
            }),
        }
    }

    pub fn as_basketball(&self) -> Option<&BasketballBox> {
        match self {
            BoxscoreStats::Basketball(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_hockey(&self) -> Option<&HockeyBox> {
        match self {
            BoxscoreStats::Hockey(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_baseball(&self) -> Option<&BaseballBox> {
        match self {
            BoxscoreStats::Baseball(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_gridiron(&self) -> Option<&GridironBox> {
        match self {
            BoxscoreStats::Gridiron(b) => Some(b),
            _ => None,
        }
    }
}

impl BaseballBox {
    /// Total bases, rebuilt from hit types when not reported
    pub fn bases(&self) -> f64 {
        if self.total_bases != 0.0 {
            return self.total_bases;
        }
        match (self.doubles, self.triples) {
            (Some(doubles), Some(triples)) => {
                let singles = (self.hits - doubles - triples - self.home_runs).max(0.0);
                singles + 2.0 * doubles + 3.0 * triples + 4.0 * self.home_runs
            }
            _ => self.hits + 3.0 * self.home_runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, f64)]) -> RawStats {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_gridiron_injects_opponent_turnovers() {
        let own = raw(&[("turnovers", 2.0), ("total_yards", 350.0)]);
        let opp = raw(&[("turnovers", 3.0)]);

        let with_opp = BoxscoreStats::from_raw(StatFamily::Gridiron, &own, Some(&opp));
        assert_eq!(with_opp.as_gridiron().unwrap().opp_turnovers, Some(3.0));

        let alone = BoxscoreStats::from_raw(StatFamily::Gridiron, &own, None);
        assert_eq!(alone.as_gridiron().unwrap().opp_turnovers, None);
    }

    #[test]
    fn test_basketball_three_point_alias() {
        let own = raw(&[("3ptm", 12.0), ("fga", 85.0)]);
        let stats = BoxscoreStats::from_raw(StatFamily::Basketball, &own, None);
        assert_eq!(stats.as_basketball().unwrap().fg3m, 12.0);
        assert!(stats.as_hockey().is_none());
    }

    #[test]
    fn test_total_bases_from_components() {
        let with_types = BaseballBox {
            hits: 10.0,
            doubles: Some(2.0),
            triples: Some(1.0),
            home_runs: 1.0,
            ..Default::default()
        };
        // 6 singles + 4 + 3 + 4
        assert_eq!(with_types.bases(), 17.0);

        let rough = BaseballBox {
            hits: 10.0,
            home_runs: 1.0,
            ..Default::default()
        };
        assert_eq!(rough.bases(), 13.0);
    }
}
