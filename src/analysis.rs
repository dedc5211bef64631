//! Batch analysis of parameter sets.
//!
//! For each configured parameter set the analysis solves the Nash, Bayesian
//! and community Bayesian equilibria, plays one random round and runs the
//! evolutionary simulator. A Monte-Carlo simulation over the base parameters
//! runs first.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::evolution::{EvolutionConfig, EvolutionResult, EvolutionarySimulator};
use crate::game::{GameError, GameParameters, GameState};
use crate::simulation::{run_simulation, ProfitSummary, SimulationReport};
use crate::solver::{
    BayesianObjective, BayesianResult, BayesianSolver, ConfigError, EquilibriumResult, NashSolver,
    SolverConfig, SolverError, TypeDistribution,
};

/// One game configuration to analyze.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    /// Label used in reports.
    pub name: String,
    /// Game parameters.
    pub game_parameters: GameParameters,
    /// Time constraint of the game.
    pub time_constraint: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            game_parameters: GameParameters::default(),
            time_constraint: 50.0,
        }
    }
}

/// Configuration of a full analysis run.
///
/// # Example
/// ```
/// use community_betting_solver::analysis::AnalysisConfig;
///
/// let config = AnalysisConfig::from_json_str(r#"{
///     "simulation_trials": 100,
///     "parameter_sets": [{"name": "short", "time_constraint": 10.0}]
/// }"#).unwrap();
/// assert_eq!(config.parameter_sets[0].name, "short");
/// assert_eq!(config.generations, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Parameter sets to analyze.
    pub parameter_sets: Vec<ParameterSet>,
    /// Parameters of the Monte-Carlo simulation.
    pub simulation_parameters: GameParameters,
    /// Number of Monte-Carlo trials.
    pub simulation_trials: usize,
    /// Generations of each evolutionary run.
    pub generations: usize,
    /// Type distribution given to every player in the Bayesian solves.
    pub type_probabilities: Vec<f64>,
    /// Solver configuration.
    pub solver: SolverConfig,
    /// Evolutionary simulator configuration.
    pub evolution: EvolutionConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parameter_sets: vec![ParameterSet::default()],
            simulation_parameters: GameParameters {
                greed_factor: 0.15,
                group_factor: 0.2,
                community_factor: 0.35,
                stability_factor: 0.25,
                ..GameParameters::default()
            },
            simulation_trials: 1000,
            generations: 10,
            type_probabilities: vec![0.7, 0.3],
            solver: SolverConfig::default(),
            evolution: EvolutionConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path).map_err(|e| AnalysisError::Io(e.to_string()))?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a configuration.
    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AnalysisError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builder method: seed every random component that has no seed yet.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.solver.seed.get_or_insert(seed);
        self.evolution.seed.get_or_insert(seed);
        self.evolution.solver.seed.get_or_insert(seed);
        self
    }

    /// Validate every nested configuration.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.simulation_parameters.validate()?;
        for set in &self.parameter_sets {
            set.game_parameters.validate()?;
        }
        self.solver.validate()?;
        self.evolution.validate()?;
        TypeDistribution::new(self.type_probabilities.clone()).validate(0)?;
        Ok(())
    }
}

/// Errors of an analysis run.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The configuration file could not be read.
    Io(String),
    /// The configuration file is not valid JSON for [`AnalysisConfig`].
    Parse(String),
    /// Invalid game parameters.
    Game(GameError),
    /// Rejected solver request.
    Solver(SolverError),
    /// Invalid solver or simulator configuration.
    Config(ConfigError),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Io(e) => write!(f, "Failed to read configuration: {}", e),
            AnalysisError::Parse(e) => write!(f, "Failed to parse configuration: {}", e),
            AnalysisError::Game(e) => write!(f, "{}", e),
            AnalysisError::Solver(e) => write!(f, "{}", e),
            AnalysisError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<GameError> for AnalysisError {
    fn from(e: GameError) -> Self {
        AnalysisError::Game(e)
    }
}

impl From<SolverError> for AnalysisError {
    fn from(e: SolverError) -> Self {
        AnalysisError::Solver(e)
    }
}

impl From<ConfigError> for AnalysisError {
    fn from(e: ConfigError) -> Self {
        AnalysisError::Config(e)
    }
}

/// Results for one parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSetReport {
    /// Label of the set.
    pub name: String,
    /// Time constraint of the game.
    pub time_constraint: f64,
    /// Pure Nash equilibrium.
    pub nash: EquilibriumResult,
    /// Bayesian equilibrium.
    pub bayesian: BayesianResult,
    /// Community-focused Bayesian equilibrium.
    pub community_bayesian: BayesianResult,
    /// Layer 1 total of one random round.
    pub layer1_profit: f64,
    /// Layer 2 total of one random round.
    pub layer2_profit: f64,
    /// Community score after that round.
    pub community_score: f64,
    /// Reputations after that round.
    pub reputations: Vec<f64>,
    /// Evolutionary trajectory.
    pub evolution: EvolutionResult,
}

/// Full analysis output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Monte-Carlo simulation over the base parameters.
    pub simulation: SimulationReport,
    /// Per parameter set results.
    pub parameter_sets: Vec<ParameterSetReport>,
    /// Layer 1 profits across parameter sets.
    pub layer1_profits: ProfitSummary,
    /// Layer 2 profits across parameter sets.
    pub layer2_profits: ProfitSummary,
}

impl AnalysisReport {
    /// Assemble a report and summarize profits across sets.
    pub fn new(simulation: SimulationReport, parameter_sets: Vec<ParameterSetReport>) -> Self {
        let layer1: Vec<f64> = parameter_sets.iter().map(|r| r.layer1_profit).collect();
        let layer2: Vec<f64> = parameter_sets.iter().map(|r| r.layer2_profit).collect();
        Self {
            simulation,
            layer1_profits: ProfitSummary::from_samples(&layer1),
            layer2_profits: ProfitSummary::from_samples(&layer2),
            parameter_sets,
        }
    }

    /// Save to JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())
    }
}

/// Run the Monte-Carlo simulation of an analysis.
pub fn simulate(config: &AnalysisConfig, seed: Option<u64>) -> Result<SimulationReport, AnalysisError> {
    Ok(run_simulation(
        &config.simulation_parameters,
        config.simulation_trials,
        seed,
    )?)
}

/// Analyze one parameter set.
pub fn analyze_parameter_set(
    set: &ParameterSet,
    config: &AnalysisConfig,
    seed: Option<u64>,
) -> Result<ParameterSetReport, AnalysisError> {
    let params = set.game_parameters.clone();
    let mut game = match seed {
        Some(seed) => GameState::with_seed(params, set.time_constraint, seed)?,
        None => GameState::new(params, set.time_constraint)?,
    };

    let nash = NashSolver::new(config.solver.clone()).solve(&game);

    let distributions = vec![
        TypeDistribution::new(config.type_probabilities.clone());
        set.game_parameters.n_players
    ];
    let bayesian_solver = BayesianSolver::new(config.solver.clone());
    let bayesian = bayesian_solver.solve(&game, &distributions, BayesianObjective::Standard)?;
    let community_bayesian =
        bayesian_solver.solve(&game, &distributions, BayesianObjective::Community)?;

    let evolution =
        EvolutionarySimulator::new(config.evolution.clone())?.run(&game, config.generations);

    let round = game.play_random_round();
    log::info!(
        "{}: layer1 {:.2}, layer2 {:.2}, community score {:.2}",
        set.name,
        round.layer1_total(),
        round.layer2_total(),
        game.community_score()
    );

    Ok(ParameterSetReport {
        name: set.name.clone(),
        time_constraint: set.time_constraint,
        nash,
        bayesian,
        community_bayesian,
        layer1_profit: round.layer1_total(),
        layer2_profit: round.layer2_total(),
        community_score: game.community_score(),
        reputations: game.players().iter().map(|p| p.reputation).collect(),
        evolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.simulation_trials = 20;
        config.generations = 2;
        config.parameter_sets = vec![ParameterSet {
            name: "small".to_string(),
            game_parameters: GameParameters::default().with_players(3, 2),
            time_constraint: 20.0,
        }];
        config.solver = SolverConfig::fast();
        config.evolution = EvolutionConfig::default()
            .with_population_size(30)
            .with_solver(SolverConfig::fast());
        config.with_seed(4)
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_json_is_reported() {
        assert!(matches!(
            AnalysisConfig::from_json_str("{ not json"),
            Err(AnalysisError::Parse(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_json_str(r#"{"type_probabilities": [0.5, 0.2]}"#),
            Err(AnalysisError::Solver(SolverError::InvalidTypeDistribution { .. }))
        ));
        assert!(matches!(
            AnalysisConfig::from_json_file("does/not/exist.json"),
            Err(AnalysisError::Io(_))
        ));
    }

    #[test]
    fn test_with_seed_keeps_explicit_seeds() {
        let mut config = AnalysisConfig::default();
        config.solver.seed = Some(1);
        let config = config.with_seed(9);
        assert_eq!(config.solver.seed, Some(1));
        assert_eq!(config.evolution.seed, Some(9));
    }

    #[test]
    fn test_analyze_parameter_set() {
        let config = quick_config();
        let report = analyze_parameter_set(&config.parameter_sets[0], &config, Some(4)).unwrap();

        assert_eq!(report.nash.profile.len(), 3);
        assert_eq!(report.bayesian.combinations, 8);
        assert_eq!(report.community_bayesian.objective, BayesianObjective::Community);
        assert_eq!(report.evolution.history.len(), 2);
        assert!((0.0..=100.0).contains(&report.community_score));

        let simulation = simulate(&config, Some(4)).unwrap();
        let full = AnalysisReport::new(simulation, vec![report]);
        assert_eq!(full.layer1_profits.variance, 0.0);
        assert!(serde_json::to_string(&full).is_ok());
    }
}
