//! Benchmarks for the payoff model and the solvers.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use community_betting_solver::evolution::individual_fitness;
use community_betting_solver::game::{GameParameters, GameState, Payoff};
use community_betting_solver::solver::{
    BayesianObjective, BayesianSolver, NashSolver, SolverConfig, TypeDistribution,
};

fn game() -> GameState {
    GameState::with_seed(GameParameters::default(), 50.0, 42).unwrap()
}

fn total_utility_benchmark(c: &mut Criterion) {
    let game = game();
    let profile = [12.0, 30.0, 45.0, 60.0, 75.0];

    c.bench_function("total_utility_5_players", |b| {
        b.iter(|| black_box(game.total_utility(black_box(&profile))))
    });
}

fn nash_solve_benchmark(c: &mut Criterion) {
    let game = game();
    let solver = NashSolver::new(SolverConfig::fast().with_seed(42));

    c.bench_function("nash_solve_5_players", |b| {
        b.iter(|| black_box(solver.solve(&game).total_utility))
    });
}

fn bayesian_solve_benchmark(c: &mut Criterion) {
    let params = GameParameters::default().with_players(3, 2);
    let game = GameState::with_seed(params, 50.0, 42).unwrap();
    let dists = vec![TypeDistribution::new(vec![0.7, 0.3]); 3];
    let solver = BayesianSolver::new(SolverConfig::fast().with_seed(42));

    c.bench_function("bayesian_solve_3_players_2_types", |b| {
        b.iter(|| {
            solver
                .solve(&game, &dists, BayesianObjective::Standard)
                .map(|r| r.expected_utility)
        })
    });
}

fn fitness_benchmark(c: &mut Criterion) {
    let game = game();
    let strategy = [20.0, 25.0, 30.0, 35.0, 40.0];

    c.bench_function("individual_fitness", |b| {
        b.iter(|| individual_fitness(&game, black_box(&strategy), 7))
    });
}

criterion_group!(
    benches,
    total_utility_benchmark,
    nash_solve_benchmark,
    bayesian_solve_benchmark,
    fitness_benchmark
);
criterion_main!(benches);
