//! Stop ordering over a turn-aware leg matrix.
//!
//! Besides the cost of every leg, a tour pays for the turn made at each stop:
//! the heading on arrival (last segment of the inbound leg) against the
//! heading on departure (first segment of the outbound leg). Waypoint 0 is
//! the depot and always comes first.

use std::fmt;
use std::str::FromStr;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::algorithms::matrix::LegMatrix;
use crate::algorithms::turn_cost::TurnCostModel;
use crate::algorithms::RouteSolver;
use crate::models::{Cost, TurnKind};

/// Improvements smaller than this are treated as ties
const EPSILON: Cost = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    /// Exhaustive for small requests, local search otherwise
    #[default]
    Auto,
    NearestNeighbor,
    TwoOpt,
    Exhaustive,
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SolverKind::Auto),
            "nearest" | "nearest-neighbor" => Ok(SolverKind::NearestNeighbor),
            "two-opt" | "2opt" => Ok(SolverKind::TwoOpt),
            "exhaustive" | "exact" => Ok(SolverKind::Exhaustive),
            other => Err(format!(
                "unknown solver '{}', expected auto, nearest, two-opt or exhaustive",
                other
            )),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverKind::Auto => "auto",
            SolverKind::NearestNeighbor => "nearest-neighbor",
            SolverKind::TwoOpt => "two-opt",
            SolverKind::Exhaustive => "exhaustive",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub kind: SolverKind,
    /// Return to the depot after the last stop
    pub round_trip: bool,
    /// Largest number of stops (depot excluded) solved exactly by `Auto`
    pub exact_limit: usize,
    /// Local search passes per start
    pub max_iterations: usize,
    /// Number of greedy starts refined by two-opt
    pub starts: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            kind: SolverKind::Auto,
            round_trip: false,
            exact_limit: 8,
            max_iterations: 1_000,
            starts: 8,
        }
    }
}

/// Turn penalty at stop `current` when arriving from `previous` and leaving for `next`
pub fn stop_penalty(
    matrix: &LegMatrix,
    model: &TurnCostModel,
    previous: usize,
    current: usize,
    next: usize,
) -> Cost {
    stop_turn(matrix, previous, current, next)
        .map(|kind| model.stop_penalty(kind))
        .unwrap_or(0.0)
}

/// Kind of turn made at a stop, `None` when either leg has no heading
pub fn stop_turn(matrix: &LegMatrix, previous: usize, current: usize, next: usize) -> Option<TurnKind> {
    let arrival = matrix.leg(previous, current)?.arrival_bearing?;
    let departure = matrix.leg(current, next)?.departure_bearing?;
    Some(TurnKind::between(arrival, departure))
}

/// Total cost of visiting `order`: legs plus the turn made at every stop
pub fn tour_cost(matrix: &LegMatrix, model: &TurnCostModel, order: &[usize], round_trip: bool) -> Cost {
    if order.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for pair in order.windows(2) {
        total += matrix.cost(pair[0], pair[1]);
    }
    for triple in order.windows(3) {
        total += stop_penalty(matrix, model, triple[0], triple[1], triple[2]);
    }

    if round_trip {
        let last = order[order.len() - 1];
        let before_last = order[order.len() - 2];
        total += matrix.cost(last, order[0]);
        total += stop_penalty(matrix, model, before_last, last, order[0]);
    }

    total
}

/// Greedy construction: always drive to the cheapest next stop, counting the
/// turn at the current stop. `prefix` fixes the first stops (must start at 0).
fn greedy_from(matrix: &LegMatrix, model: &TurnCostModel, prefix: &[usize]) -> Vec<usize> {
    let n = matrix.size();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    for &stop in prefix {
        visited[stop] = true;
        order.push(stop);
    }

    while order.len() < n {
        let current = order[order.len() - 1];
        let previous = order.len().checked_sub(2).map(|i| order[i]);

        let mut best_next = None;
        let mut best_cost = f64::INFINITY;
        for candidate in 0..n {
            if visited[candidate] {
                continue;
            }
            let mut cost = matrix.cost(current, candidate);
            if let Some(previous) = previous {
                cost += stop_penalty(matrix, model, previous, current, candidate);
            }
            if cost < best_cost {
                best_cost = cost;
                best_next = Some(candidate);
            }
        }

        // Everything left is unreachable from here: keep request order
        let next = match best_next {
            Some(next) => next,
            None => match visited.iter().position(|&seen| !seen) {
                Some(next) => next,
                None => break,
            },
        };
        visited[next] = true;
        order.push(next);
    }

    order
}

/// Nearest-neighbour ordering with turn penalties at stops
pub struct NearestNeighbor<'a> {
    pub model: &'a TurnCostModel,
}

impl RouteSolver for NearestNeighbor<'_> {
    fn solve(&self, matrix: &LegMatrix, _round_trip: bool) -> Vec<usize> {
        if matrix.size() == 0 {
            return Vec::new();
        }
        greedy_from(matrix, self.model, &[0])
    }
}

/// Multi-start greedy refined by segment reversal and stop relocation
pub struct TwoOpt<'a> {
    pub model: &'a TurnCostModel,
    pub max_iterations: usize,
    pub starts: usize,
}

impl TwoOpt<'_> {
    /// Local search until no move improves the tour or the pass budget runs out
    fn improve(&self, matrix: &LegMatrix, mut order: Vec<usize>, round_trip: bool) -> (Vec<usize>, Cost) {
        let n = order.len();
        let mut best = tour_cost(matrix, self.model, &order, round_trip);
        if n < 3 {
            return (order, best);
        }

        for _ in 0..self.max_iterations {
            let mut improved = false;

            // Reverse order[i..=j]; the depot at position 0 never moves
            for i in 1..n - 1 {
                for j in i + 1..n {
                    order[i..=j].reverse();
                    let cost = tour_cost(matrix, self.model, &order, round_trip);
                    if cost < best - EPSILON {
                        best = cost;
                        improved = true;
                    } else {
                        order[i..=j].reverse();
                    }
                }
            }

            // Move a single stop to another position
            for from in 1..n {
                for to in 1..n {
                    if from == to {
                        continue;
                    }
                    let stop = order.remove(from);
                    order.insert(to, stop);
                    let cost = tour_cost(matrix, self.model, &order, round_trip);
                    if cost < best - EPSILON {
                        best = cost;
                        improved = true;
                    } else {
                        let stop = order.remove(to);
                        order.insert(from, stop);
                    }
                }
            }

            if !improved {
                break;
            }
        }

        (order, best)
    }
}

impl RouteSolver for TwoOpt<'_> {
    fn solve(&self, matrix: &LegMatrix, round_trip: bool) -> Vec<usize> {
        let n = matrix.size();
        if n <= 2 {
            return (0..n).collect();
        }

        // Plain greedy plus greedy runs forced through the cheapest first stops
        let mut firsts: Vec<usize> = (1..n).collect();
        firsts.sort_by(|&a, &b| matrix.cost(0, a).total_cmp(&matrix.cost(0, b)));
        firsts.truncate(self.starts.max(1));

        let mut seeds = vec![greedy_from(matrix, self.model, &[0])];
        seeds.extend(
            firsts
                .into_iter()
                .map(|first| greedy_from(matrix, self.model, &[0, first])),
        );
        seeds.dedup();

        let results: Vec<(Vec<usize>, Cost)> = seeds
            .into_par_iter()
            .map(|seed| self.improve(matrix, seed, round_trip))
            .collect();

        // Earliest seed wins ties, which keeps the result deterministic
        let mut best: Option<(Vec<usize>, Cost)> = None;
        for (order, cost) in results {
            let better = match &best {
                Some((_, best_cost)) => cost < best_cost - EPSILON,
                None => true,
            };
            if better {
                best = Some((order, cost));
            }
        }

        let (order, cost) = best.unwrap_or_else(|| ((0..n).collect(), f64::INFINITY));
        debug!("two-opt tour cost {:.1}s", cost);
        order
    }
}

/// Exact search over all stop permutations with branch-and-bound pruning
pub struct Exhaustive<'a> {
    pub model: &'a TurnCostModel,
}

struct Search<'s> {
    matrix: &'s LegMatrix,
    model: &'s TurnCostModel,
    round_trip: bool,
    order: Vec<usize>,
    visited: Vec<bool>,
    best_order: Vec<usize>,
    best_cost: Cost,
}

impl Search<'_> {
    fn extend(&mut self, partial: Cost) {
        let n = self.matrix.size();
        let current = self.order[self.order.len() - 1];
        let previous = self.order.len().checked_sub(2).map(|i| self.order[i]);

        if self.order.len() == n {
            let mut total = partial;
            if self.round_trip {
                total += self.matrix.cost(current, 0);
                if let Some(previous) = previous {
                    total += stop_penalty(self.matrix, self.model, previous, current, 0);
                }
            }
            if total < self.best_cost - EPSILON || self.best_order.is_empty() {
                self.best_cost = total;
                self.best_order = self.order.clone();
            }
            return;
        }

        for next in 1..n {
            if self.visited[next] {
                continue;
            }
            let mut cost = partial + self.matrix.cost(current, next);
            if let Some(previous) = previous {
                cost += stop_penalty(self.matrix, self.model, previous, current, next);
            }
            // Costs never decrease along a tour
            if cost >= self.best_cost && !self.best_order.is_empty() {
                continue;
            }

            self.visited[next] = true;
            self.order.push(next);
            self.extend(cost);
            self.order.pop();
            self.visited[next] = false;
        }
    }
}

impl RouteSolver for Exhaustive<'_> {
    fn solve(&self, matrix: &LegMatrix, round_trip: bool) -> Vec<usize> {
        let n = matrix.size();
        if n <= 2 {
            return (0..n).collect();
        }

        let mut visited = vec![false; n];
        visited[0] = true;
        let mut search = Search {
            matrix,
            model: self.model,
            round_trip,
            order: vec![0],
            visited,
            best_order: Vec::new(),
            best_cost: f64::INFINITY,
        };
        search.extend(0.0);

        debug!("exhaustive tour cost {:.1}s", search.best_cost);
        search.best_order
    }
}

/// Picks the solver for the request size and returns the visiting order
pub fn solve_order(matrix: &LegMatrix, model: &TurnCostModel, options: &SolverOptions) -> Vec<usize> {
    let stops = matrix.size().saturating_sub(1);
    let kind = match options.kind {
        SolverKind::Auto if stops <= options.exact_limit => SolverKind::Exhaustive,
        SolverKind::Auto => SolverKind::TwoOpt,
        kind => kind,
    };
    debug!("Ordering {} stops with the {} solver", stops, kind);

    match kind {
        SolverKind::NearestNeighbor => NearestNeighbor { model }.solve(matrix, options.round_trip),
        SolverKind::Exhaustive => Exhaustive { model }.solve(matrix, options.round_trip),
        _ => TwoOpt {
            model,
            max_iterations: options.max_iterations,
            starts: options.starts,
        }
        .solve(matrix, options.round_trip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Leg;

    fn leg(cost: Cost, bearing: f64) -> Option<Leg> {
        Some(Leg {
            nodes: vec![1, 2],
            cost_s: cost,
            distance_m: cost * 10.0,
            departure_bearing: Some(bearing),
            arrival_bearing: Some(bearing),
            turns: Default::default(),
        })
    }

    /// Depot 0 south of stop 1. From 1 (arriving northbound), stop 2 lies to
    /// the east (right turn) and is slightly closer than stop 3 to the west.
    fn junction_matrix() -> LegMatrix {
        let legs = vec![
            // from 0
            Some(Leg::empty(0)),
            leg(10.0, 0.0),
            leg(30.0, 45.0),
            leg(30.0, 315.0),
            // from 1
            leg(10.0, 180.0),
            Some(Leg::empty(1)),
            leg(10.0, 90.0),
            leg(12.0, 270.0),
            // from 2
            leg(30.0, 225.0),
            leg(10.0, 270.0),
            Some(Leg::empty(2)),
            leg(20.0, 270.0),
            // from 3
            leg(30.0, 135.0),
            leg(12.0, 90.0),
            leg(20.0, 90.0),
            Some(Leg::empty(3)),
        ];
        LegMatrix::from_legs(4, legs).unwrap()
    }

    #[test]
    fn test_nearest_neighbor_avoids_right_turn() {
        let matrix = junction_matrix();
        let model = TurnCostModel::india();
        let order = NearestNeighbor { model: &model }.solve(&matrix, false);
        assert_eq!(order, vec![0, 1, 3, 2]);

        let plain = TurnCostModel::travel_time_only();
        let order = NearestNeighbor { model: &plain }.solve(&matrix, false);
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_tour_cost_includes_stop_turns() {
        let matrix = junction_matrix();
        let model = TurnCostModel::india();

        // 0 -> 1 -> 2: right turn at 1, then 2 -> 3 westbound after arriving eastbound
        let cost = tour_cost(&matrix, &model, &[0, 1, 2, 3], false);
        let expected = 10.0 + 10.0 + 20.0 + model.crossing_turn_penalty_s + model.u_turn_penalty_s;
        assert!((cost - expected).abs() < 1e-9, "got {}", cost);

        assert_eq!(tour_cost(&matrix, &model, &[0], false), 0.0);
        let plain = TurnCostModel::travel_time_only();
        assert_eq!(tour_cost(&matrix, &plain, &[0, 1, 2, 3], true), 10.0 + 10.0 + 20.0 + 30.0);
    }

    #[test]
    fn test_exhaustive_is_never_worse() {
        let matrix = junction_matrix();
        let model = TurnCostModel::india();

        for round_trip in [false, true] {
            let exact = Exhaustive { model: &model }.solve(&matrix, round_trip);
            let greedy = NearestNeighbor { model: &model }.solve(&matrix, round_trip);
            let local = TwoOpt {
                model: &model,
                max_iterations: 100,
                starts: 3,
            }
            .solve(&matrix, round_trip);

            let exact_cost = tour_cost(&matrix, &model, &exact, round_trip);
            let local_cost = tour_cost(&matrix, &model, &local, round_trip);
            let greedy_cost = tour_cost(&matrix, &model, &greedy, round_trip);

            assert_eq!(exact[0], 0);
            assert_eq!(local[0], 0);
            assert!(exact_cost <= local_cost + 1e-9);
            assert!(local_cost <= greedy_cost + 1e-9);
        }
    }

    #[test]
    fn test_trivial_sizes() {
        let model = TurnCostModel::india();
        let one = LegMatrix::from_legs(1, vec![Some(Leg::empty(0))]).unwrap();
        let two = LegMatrix::from_legs(
            2,
            vec![Some(Leg::empty(0)), leg(5.0, 0.0), leg(5.0, 180.0), Some(Leg::empty(1))],
        )
        .unwrap();

        for kind in [SolverKind::NearestNeighbor, SolverKind::TwoOpt, SolverKind::Exhaustive] {
            let options = SolverOptions {
                kind,
                ..SolverOptions::default()
            };
            assert_eq!(solve_order(&one, &model, &options), vec![0]);
            assert_eq!(solve_order(&two, &model, &options), vec![0, 1]);
        }
    }

    #[test]
    fn test_unreachable_stops_are_still_ordered() {
        let legs = vec![
            Some(Leg::empty(0)),
            leg(10.0, 0.0),
            None,
            leg(10.0, 180.0),
            Some(Leg::empty(1)),
            None,
            None,
            None,
            Some(Leg::empty(2)),
        ];
        let matrix = LegMatrix::from_legs(3, legs).unwrap();
        let model = TurnCostModel::india();

        let order = NearestNeighbor { model: &model }.solve(&matrix, false);
        assert_eq!(order, vec![0, 1, 2]);
        assert!(tour_cost(&matrix, &model, &order, false).is_infinite());
    }

    #[test]
    fn test_solver_kind_parsing() {
        assert_eq!("nearest".parse::<SolverKind>(), Ok(SolverKind::NearestNeighbor));
        assert_eq!("two-opt".parse::<SolverKind>(), Ok(SolverKind::TwoOpt));
        assert_eq!("exact".parse::<SolverKind>(), Ok(SolverKind::Exhaustive));
        assert!("genetic".parse::<SolverKind>().is_err());
        assert_eq!(SolverKind::TwoOpt.to_string(), "two-opt");
    }
}
