//! Vector optimizers: the propose/observe seam and a default genetic
//! algorithm.

use dse_types::{validation_error, DseResult, FlatVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;

/// Common trait for anything that proposes flat vectors in rounds and
/// learns from their objective values. Objectives are minimized.
pub trait VectorOptimizer: Send {
    /// Candidates to evaluate this round.
    fn ask(&mut self) -> Vec<FlatVector>;

    /// Objective values for the candidates of the last `ask`, same order.
    fn tell(&mut self, objectives: &[f64]) -> DseResult<()>;

    /// Human-readable optimizer name.
    fn name(&self) -> &str;
}

/// Genetic algorithm settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticConfig {
    /// Individuals per generation.
    pub population_size: usize,
    /// Per-gene probability of resampling during mutation.
    pub mutation_probability: f64,
    /// Probability that a parent pair undergoes crossover.
    pub crossover_probability: f64,
    /// Contestants per tournament.
    pub tournament_size: usize,
    /// RNG seed; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 4,
            mutation_probability: 0.1,
            crossover_probability: 1.0,
            tournament_size: 3,
            seed: None,
        }
    }
}

impl GeneticConfig {
    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    pub fn with_mutation_probability(mut self, p: f64) -> Self {
        self.mutation_probability = p;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> DseResult<()> {
        if self.population_size == 0 {
            return Err(validation_error!("population size must be positive"));
        }
        if self.tournament_size == 0 {
            return Err(validation_error!("tournament size must be positive"));
        }
        for (name, p) in [
            ("mutation", self.mutation_probability),
            ("crossover", self.crossover_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(validation_error!("{name} probability {p} is outside [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Genetic algorithm over the precision lattice of a [`Bounds`].
///
/// Genes are lattice indices, so every proposed slot is exactly
/// `lower + k * precision`. Each generation: tournament selection, two-point
/// crossover on consecutive pairs, per-gene resampling mutation. There is no
/// elitism; callers track the best individual they have seen.
#[derive(Debug, Clone)]
pub struct GeneticOptimizer {
    bounds: Bounds,
    config: GeneticConfig,
    population: Vec<Vec<usize>>,
    rng: ChaCha8Rng,
    generation: usize,
}

impl GeneticOptimizer {
    pub fn new(bounds: Bounds, config: GeneticConfig) -> DseResult<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let population: Vec<Vec<usize>> = (0..config.population_size)
            .map(|_| {
                (0..bounds.len())
                    .map(|i| rng.gen_range(0..bounds.levels(i)))
                    .collect()
            })
            .collect();

        Ok(Self {
            bounds,
            config,
            population,
            rng,
            generation: 0,
        })
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    /// Number of completed generations.
    pub fn generation(&self) -> usize {
        self.generation
    }

    fn to_vector(&self, genes: &[usize]) -> FlatVector {
        genes
            .iter()
            .enumerate()
            .map(|(i, level)| self.bounds.level_value(i, *level))
            .collect()
    }

    fn tournament(&mut self, objectives: &[f64]) -> usize {
        let n = objectives.len();
        let mut winner = self.rng.gen_range(0..n);
        for _ in 1..self.config.tournament_size {
            let contender = self.rng.gen_range(0..n);
            if rank_key(objectives[contender]) < rank_key(objectives[winner]) {
                winner = contender;
            }
        }
        winner
    }

    fn crossover(&mut self, a: &mut [usize], b: &mut [usize]) {
        if a.is_empty() || !self.rng.gen_bool(self.config.crossover_probability) {
            return;
        }
        let mut start = self.rng.gen_range(0..a.len());
        let mut end = self.rng.gen_range(0..=a.len());
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        a[start..end].swap_with_slice(&mut b[start..end]);
    }

    fn mutate(&mut self, genes: &mut [usize]) {
        for (i, gene) in genes.iter_mut().enumerate() {
            if self.rng.gen_bool(self.config.mutation_probability) {
                *gene = self.rng.gen_range(0..self.bounds.levels(i));
            }
        }
    }
}

/// NaN objectives rank last.
fn rank_key(objective: f64) -> f64 {
    if objective.is_nan() {
        f64::INFINITY
    } else {
        objective
    }
}

impl VectorOptimizer for GeneticOptimizer {
    fn ask(&mut self) -> Vec<FlatVector> {
        self.population.iter().map(|g| self.to_vector(g)).collect()
    }

    fn tell(&mut self, objectives: &[f64]) -> DseResult<()> {
        if objectives.len() != self.population.len() {
            return Err(validation_error!(
                "expected {} objectives, got {}",
                self.population.len(),
                objectives.len()
            ));
        }

        let mut next: Vec<Vec<usize>> = (0..self.population.len())
            .map(|_| {
                let winner = self.tournament(objectives);
                self.population[winner].clone()
            })
            .collect();

        for pair in next.chunks_mut(2) {
            if let [a, b] = pair {
                self.crossover(a, b);
            }
        }
        for genes in next.iter_mut() {
            self.mutate(genes);
        }

        self.population = next;
        self.generation += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "genetic"
    }
}
