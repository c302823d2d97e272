//! Trained model artifacts
//!
//! Models are trained elsewhere and exported as JSON. Each artifact declares
//! the ordered feature names it was trained on and one of a small set of
//! estimator shapes that can be evaluated and explained here.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::features::feature_names;
use crate::{Result, ScorelineError, Sport};

/// What a model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Home win probability
    Win,
    HomeScore,
    AwayScore,
}

impl ModelRole {
    pub const ALL: [ModelRole; 3] = [ModelRole::Win, ModelRole::HomeScore, ModelRole::AwayScore];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Win => "win",
            ModelRole::HomeScore => "home_score",
            ModelRole::AwayScore => "away_score",
        }
    }
}

/// Output transform applied to the raw estimator sum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    #[default]
    Identity,
    Logistic,
}

impl Link {
    fn apply(&self, raw: f64) -> f64 {
        match self {
            Link::Identity => raw,
            Link::Logistic => 1.0 / (1.0 + (-raw).exp()),
        }
    }
}

/// A node of a regression tree; nodes are stored parent before child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Mean output of the training rows reaching this node
        #[serde(default)]
        value: Option<f64>,
    },
    Leaf {
        value: f64,
    },
}

impl TreeNode {
    fn value(&self) -> Option<f64> {
        match self {
            TreeNode::Split { value, .. } => *value,
            TreeNode::Leaf { value } => Some(*value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Leaf reached by `x`; `x <= threshold` goes left
    fn leaf(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => idx = if x[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    /// Add each split's value change along the decision path to its feature.
    /// Returns `None` when a visited split carries no node value.
    fn attribute(&self, x: &[f64], out: &mut [f64]) -> Option<()> {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { .. } => return Some(()),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    value,
                } => {
                    let parent = (*value)?;
                    let next = if x[*feature] <= *threshold { *left } else { *right };
                    out[*feature] += self.nodes[next].value()? - parent;
                    idx = next;
                }
            }
        }
    }

    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {} splits on unknown feature {}", idx, feature));
                }
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(format!("node {} has invalid child {}", idx, child));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-feature standardisation applied before a linear model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| if *s != 0.0 { (v - m) / s } else { v - m })
            .collect()
    }
}

/// Evaluable model shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    TreeEnsemble {
        #[serde(default)]
        base_score: f64,
        trees: Vec<Tree>,
        #[serde(default)]
        link: Link,
    },
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
        #[serde(default)]
        scaler: Option<StandardScaler>,
        #[serde(default)]
        link: Link,
    },
    /// Fixed output with no inspectable structure
    OpaqueConstant { value: f64 },
}

impl Estimator {
    pub fn predict(&self, x: &[f64]) -> f64 {
        match self {
            Estimator::TreeEnsemble {
                base_score,
                trees,
                link,
            } => link.apply(base_score + trees.iter().map(|t| t.leaf(x)).sum::<f64>()),
            Estimator::Linear {
                intercept,
                coefficients,
                scaler,
                link,
            } => {
                let scaled = scale(scaler.as_ref(), x);
                let raw = intercept
                    + coefficients
                        .iter()
                        .zip(&scaled)
                        .map(|(c, v)| c * v)
                        .sum::<f64>();
                link.apply(raw)
            }
            Estimator::OpaqueConstant { value } => *value,
        }
    }

    /// Path attribution summed over all trees, in raw output units
    pub fn tree_contributions(&self, x: &[f64]) -> Option<Vec<f64>> {
        match self {
            Estimator::TreeEnsemble { trees, .. } => {
                let mut out = vec![0.0; x.len()];
                for tree in trees {
                    tree.attribute(x, &mut out)?;
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// Coefficient times standardised value per feature
    pub fn linear_contributions(&self, x: &[f64]) -> Option<Vec<f64>> {
        match self {
            Estimator::Linear {
                coefficients,
                scaler,
                ..
            } => Some(
                coefficients
                    .iter()
                    .zip(scale(scaler.as_ref(), x))
                    .map(|(c, v)| c * v)
                    .collect(),
            ),
            _ => None,
        }
    }

    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        match self {
            Estimator::TreeEnsemble { trees, .. } => trees
                .iter()
                .enumerate()
                .try_for_each(|(i, t)| t.validate(n_features).map_err(|e| format!("tree {}: {}", i, e))),
            Estimator::Linear {
                coefficients,
                scaler,
                ..
            } => {
                if coefficients.len() != n_features {
                    return Err(format!(
                        "{} coefficients for {} features",
                        coefficients.len(),
                        n_features
                    ));
                }
                if let Some(s) = scaler {
                    if s.mean.len() != n_features || s.scale.len() != n_features {
                        return Err("scaler width does not match features".to_string());
                    }
                }
                Ok(())
            }
            Estimator::OpaqueConstant { .. } => Ok(()),
        }
    }
}

fn scale(scaler: Option<&StandardScaler>, x: &[f64]) -> Vec<f64> {
    match scaler {
        Some(s) => s.transform(x),
        None => x.to_vec(),
    }
}

/// One exported model and the input schema it expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub sport: Sport,
    pub role: ModelRole,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
    pub estimator: Estimator,
}

impl ModelArtifact {
    /// Load and validate an artifact against the sport's feature schema
    pub fn load(path: &Path, sport: Sport, role: ModelRole) -> Result<Self> {
        if !path.exists() {
            return Err(ScorelineError::ModelNotFound {
                sport,
                role: role.as_str().to_string(),
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&content)?;
        artifact.validate(sport, role).map_err(|reason| {
            ScorelineError::Configuration(format!("Invalid model {}: {}", path.display(), reason))
        })?;
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.estimator.predict(x)
    }

    fn validate(&self, sport: Sport, role: ModelRole) -> std::result::Result<(), String> {
        if self.sport != sport || self.role != role {
            return Err(format!(
                "declares {} {} but was loaded as {} {}",
                self.sport,
                self.role.as_str(),
                sport,
                role.as_str()
            ));
        }

        let schema: HashSet<String> = feature_names(sport).into_iter().collect();
        let mut seen = HashSet::new();
        for name in &self.feature_names {
            if !schema.contains(name) {
                return Err(format!("feature '{}' is not produced for {}", name, sport));
            }
            if !seen.insert(name) {
                return Err(format!("feature '{}' declared twice", name));
            }
        }

        if let Some(importances) = &self.feature_importances {
            if importances.len() != self.feature_names.len() {
                return Err("importances do not match feature names".to_string());
            }
        }
        self.estimator.validate(self.feature_names.len())
    }
}

/// The three models a sport needs for a prediction
#[derive(Debug, Clone)]
pub struct ModelSet {
    pub win: ModelArtifact,
    pub home_score: ModelArtifact,
    pub away_score: ModelArtifact,
}

impl ModelSet {
    pub fn load(dir: &Path, sport: Sport) -> Result<Self> {
        let load = |role| ModelArtifact::load(&artifact_path(dir, sport, role), sport, role);
        Ok(ModelSet {
            win: load(ModelRole::Win)?,
            home_score: load(ModelRole::HomeScore)?,
            away_score: load(ModelRole::AwayScore)?,
        })
    }
}

/// `{dir}/{SPORT}_{role}_model.json`
pub fn artifact_path(dir: &Path, sport: Sport, role: ModelRole) -> PathBuf {
    dir.join(format!("{}_{}_model.json", sport.code(), role.as_str()))
}

/// Lazily loaded, shared model sets keyed by sport
pub struct ModelRegistry {
    dir: PathBuf,
    cache: RwLock<HashMap<Sport, Arc<ModelSet>>>,
}

impl ModelRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ModelRegistry {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Model set for a sport, loading it on first use
    pub fn get(&self, sport: Sport) -> Result<Arc<ModelSet>> {
        if let Some(set) = self.cache.read().get(&sport) {
            return Ok(Arc::clone(set));
        }

        let set = Arc::new(ModelSet::load(&self.dir, sport)?);
        log::info!("Loaded models for {} from {}", sport, self.dir.display());
        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(sport).or_insert(set)))
    }

    /// Install a model set directly, replacing any cached one
    pub fn insert(&self, sport: Sport, set: ModelSet) {
        self.cache.write().insert(sport, Arc::new(set));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Single-split win model on `elo_diff` with node values
    pub(crate) fn stump_set(sport: Sport) -> ModelSet {
        let names = feature_names(sport);
        let win = ModelArtifact {
            sport,
            role: ModelRole::Win,
            feature_names: names.clone(),
            feature_importances: None,
            estimator: Estimator::TreeEnsemble {
                base_score: 0.0,
                trees: vec![Tree {
                    nodes: vec![
                        TreeNode::Split {
                            feature: 0,
                            threshold: 0.0,
                            left: 1,
                            right: 2,
                            value: Some(0.0),
                        },
                        TreeNode::Leaf { value: -0.8 },
                        TreeNode::Leaf { value: 0.8 },
                    ],
                }],
                link: Link::Logistic,
            },
        };
        let constant = |role, value| ModelArtifact {
            sport,
            role,
            feature_names: names.clone(),
            feature_importances: None,
            estimator: Estimator::OpaqueConstant { value },
        };
        ModelSet {
            win,
            home_score: constant(ModelRole::HomeScore, 3.4),
            away_score: constant(ModelRole::AwayScore, 2.7),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scoreline-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_tree_prediction_and_attribution() {
        let set = stump_set(Sport::Nhl);
        let mut x = vec![0.0; set.win.feature_names.len()];
        x[0] = 40.0;

        assert_relative_eq!(set.win.predict(&x), 1.0 / (1.0 + (-0.8f64).exp()));
        let contributions = set.win.estimator.tree_contributions(&x).unwrap();
        assert_relative_eq!(contributions[0], 0.8);
        assert!(contributions[1..].iter().all(|c| *c == 0.0));

        x[0] = -5.0;
        assert!(set.win.predict(&x) < 0.5);
    }

    #[test]
    fn test_missing_node_value_disables_attribution() {
        let tree = Tree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 1,
                    right: 2,
                    value: None,
                },
                TreeNode::Leaf { value: 1.0 },
                TreeNode::Leaf { value: 2.0 },
            ],
        };
        let estimator = Estimator::TreeEnsemble {
            base_score: 0.5,
            trees: vec![tree],
            link: Link::Identity,
        };
        assert_relative_eq!(estimator.predict(&[3.0]), 2.5);
        assert!(estimator.tree_contributions(&[3.0]).is_none());
    }

    #[test]
    fn test_linear_contributions_use_scaler() {
        let estimator = Estimator::Linear {
            intercept: 1.0,
            coefficients: vec![2.0, -1.0],
            scaler: Some(StandardScaler {
                mean: vec![10.0, 0.0],
                scale: vec![5.0, 2.0],
            }),
            link: Link::Identity,
        };
        let x = [20.0, 4.0];
        assert_eq!(estimator.linear_contributions(&x).unwrap(), vec![4.0, -2.0]);
        assert_relative_eq!(estimator.predict(&x), 3.0);
    }

    #[test]
    fn test_registry_reports_missing_artifacts() {
        let registry = ModelRegistry::new(scratch_dir("missing"));
        let err = registry.get(Sport::Mlb).unwrap_err();
        assert!(matches!(err, ScorelineError::ModelNotFound { sport: Sport::Mlb, .. }));
    }

    #[test]
    fn test_artifacts_load_from_disk_once() {
        let dir = scratch_dir("load");
        let set = stump_set(Sport::Nfl);
        for artifact in [&set.win, &set.home_score, &set.away_score] {
            artifact
                .save(&artifact_path(&dir, Sport::Nfl, artifact.role))
                .unwrap();
        }

        let registry = ModelRegistry::new(&dir);
        let first = registry.get(Sport::Nfl).unwrap();
        let second = registry.get(Sport::Nfl).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.win, set.win);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let dir = scratch_dir("schema");
        let mut artifact = stump_set(Sport::Nba).home_score;
        artifact.feature_names.push("home_save_pct_10".to_string());
        let path = artifact_path(&dir, Sport::Nba, ModelRole::HomeScore);
        artifact.save(&path).unwrap();

        let err = ModelArtifact::load(&path, Sport::Nba, ModelRole::HomeScore).unwrap_err();
        assert!(matches!(err, ScorelineError::Configuration(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
