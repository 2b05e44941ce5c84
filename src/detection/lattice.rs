//! Ordering of loose X-corners into the row-major grid of a chessboard.
//!
//! Seeds are ranked by how well their surroundings already look like a grid,
//! then by distance to the centre of the corner cloud. From a seed the lattice
//! is grown breadth-first: each accepted node predicts its four neighbours from
//! local step vectors, and the closest unclaimed corner within tolerance of a
//! prediction joins the grid. Steps are refreshed from every accepted edge so
//! perspective foreshortening is followed across the board.

use crate::pattern::PatternSize;
use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A corner candidate in pixel coordinates with its detector response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeCorner {
    pub position: Vector2<f64>,
    pub strength: f64,
}

impl LatticeCorner {
    pub fn new(x: f64, y: f64, strength: f64) -> Self {
        LatticeCorner {
            position: Vector2::new(x, y),
            strength,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LatticeParams {
    /// Match radius around a predicted neighbour, as a fraction of the shorter step.
    pub match_tolerance: f64,
    /// Largest `|cos|` between the two initial axes.
    pub max_axis_cosine: f64,
    /// Largest length ratio between the two initial axes.
    pub max_step_ratio: f64,
    /// Number of seeds tried, best lattice support first.
    pub max_seeds: usize,
}

impl Default for LatticeParams {
    fn default() -> Self {
        Self {
            match_tolerance: 0.3,
            max_axis_cosine: 0.5,
            max_step_ratio: 2.0,
            max_seeds: 5,
        }
    }
}

type Grid = HashMap<(i32, i32), usize>;

const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

const RING_OFFSETS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Orders `corners` into the `hcount x vcount` grid of `pattern`.
///
/// Returns row-major pixel positions (index `j * hcount + i`) where `i` grows
/// roughly along image `+x` and `j` along image `+y`, or `None` when no complete
/// grid of the requested size can be assembled.
pub fn order_corners(
    corners: &[LatticeCorner],
    pattern: PatternSize,
    params: &LatticeParams,
) -> Option<Vec<Vector2<f64>>> {
    if corners.len() < pattern.point_count() {
        debug!(
            "{} corners cannot cover a {} pattern",
            corners.len(),
            pattern
        );
        return None;
    }

    let n = corners.len() as f64;
    let centroid = corners
        .iter()
        .fold(Vector2::zeros(), |acc, c| acc + c.position)
        / n;
    let mut seeds: Vec<(usize, usize, f64)> = (0..corners.len())
        .map(|k| {
            let support = lattice_support(corners, k, params);
            (k, support, (corners[k].position - centroid).norm_squared())
        })
        .filter(|&(_, support, _)| support > 0)
        .collect();
    seeds.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.total_cmp(&b.2)));

    for &(seed, _, _) in seeds.iter().take(params.max_seeds) {
        let Some(grid) = grow_lattice(corners, seed, params) else {
            continue;
        };
        debug!("seed {} grew a lattice of {} corners", seed, grid.len());
        if grid.len() < pattern.point_count() {
            continue;
        }
        if let Some(points) = extract_pattern(&grid, corners, pattern) {
            return Some(points);
        }
    }
    None
}

/// The two shortest, roughly perpendicular offsets from `seed`.
fn initial_steps(
    corners: &[LatticeCorner],
    seed: usize,
    params: &LatticeParams,
) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let origin = corners[seed].position;
    let mut offsets: Vec<Vector2<f64>> = corners
        .iter()
        .enumerate()
        .filter(|(k, _)| *k != seed)
        .map(|(_, c)| c.position - origin)
        .filter(|d| d.norm() > f64::EPSILON)
        .collect();
    offsets.sort_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()));

    let step_i = *offsets.first()?;
    let len_i = step_i.norm();
    let step_j = offsets.iter().skip(1).find(|d| {
        let cos = d.dot(&step_i) / (d.norm() * len_i);
        cos.abs() < params.max_axis_cosine && d.norm() < params.max_step_ratio * len_i
    })?;
    Some((step_i, *step_j))
}

/// Number of the eight surrounding lattice positions of `seed` that hold a
/// corner. Interior board corners score 8; isolated clutter rarely gets past 3.
fn lattice_support(corners: &[LatticeCorner], seed: usize, params: &LatticeParams) -> usize {
    let Some((step_i, step_j)) = initial_steps(corners, seed, params) else {
        return 0;
    };
    let radius = params.match_tolerance * step_i.norm().min(step_j.norm());
    let origin = corners[seed].position;
    RING_OFFSETS
        .iter()
        .filter(|&&(di, dj)| {
            let predicted = origin + step_i * di as f64 + step_j * dj as f64;
            corners
                .iter()
                .enumerate()
                .any(|(k, c)| k != seed && (c.position - predicted).norm() <= radius)
        })
        .count()
}

fn nearest_unclaimed(
    corners: &[LatticeCorner],
    claimed: &[bool],
    target: &Vector2<f64>,
    radius: f64,
) -> Option<usize> {
    corners
        .iter()
        .enumerate()
        .filter(|(k, _)| !claimed[*k])
        .map(|(k, c)| (k, (c.position - target).norm()))
        .filter(|(_, d)| *d <= radius)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, _)| k)
}

fn grow_lattice(corners: &[LatticeCorner], seed: usize, params: &LatticeParams) -> Option<Grid> {
    let (step_i, step_j) = initial_steps(corners, seed, params)?;

    let mut grid = Grid::new();
    let mut claimed = vec![false; corners.len()];
    let mut queue = VecDeque::new();

    grid.insert((0, 0), seed);
    claimed[seed] = true;
    queue.push_back((seed, 0i32, 0i32, step_i, step_j));

    while let Some((node, i, j, step_i, step_j)) = queue.pop_front() {
        let position = corners[node].position;
        let radius = params.match_tolerance * step_i.norm().min(step_j.norm());

        for (di, dj) in NEIGHBOR_OFFSETS {
            let key = (i + di, j + dj);
            if grid.contains_key(&key) {
                continue;
            }
            let predicted = position + step_i * di as f64 + step_j * dj as f64;
            let Some(found) = nearest_unclaimed(corners, &claimed, &predicted, radius) else {
                continue;
            };

            let offset = corners[found].position - position;
            let (next_i, next_j) = if di != 0 {
                (offset * di as f64, step_j)
            } else {
                (step_i, offset * dj as f64)
            };

            grid.insert(key, found);
            claimed[found] = true;
            queue.push_back((found, key.0, key.1, next_i, next_j));
        }
    }

    Some(grid)
}

/// Mean image displacement between grid neighbours along `(dc, dr)`.
fn mean_axis(grid: &Grid, corners: &[LatticeCorner], (dc, dr): (i32, i32)) -> Vector2<f64> {
    grid.iter()
        .filter_map(|(&(c, r), &k)| {
            grid.get(&(c + dc, r + dr))
                .map(|&next| corners[next].position - corners[k].position)
        })
        .fold(Vector2::zeros(), |acc, d| acc + d)
}

/// Relabels the grid so columns run along `+x` and rows along `+y`,
/// optionally swapping the two lattice axes first.
fn orient(grid: &Grid, corners: &[LatticeCorner], transpose: bool) -> Grid {
    let swapped: Grid = grid
        .iter()
        .map(|(&(i, j), &k)| (if transpose { (j, i) } else { (i, j) }, k))
        .collect();

    let column_axis = mean_axis(&swapped, corners, (1, 0));
    let row_axis = mean_axis(&swapped, corners, (0, 1));
    // Each axis points along the positive sense of its dominant image component
    let column_lead = if column_axis.x.abs() >= column_axis.y.abs() {
        column_axis.x
    } else {
        column_axis.y
    };
    let row_lead = if row_axis.y.abs() >= row_axis.x.abs() {
        row_axis.y
    } else {
        row_axis.x
    };
    let sc = if column_lead < 0.0 { -1 } else { 1 };
    let sr = if row_lead < 0.0 { -1 } else { 1 };

    swapped
        .into_iter()
        .map(|((c, r), k)| ((c * sc, r * sr), k))
        .collect()
}

/// Top-left key of the fully populated `hcount x vcount` window with the
/// strongest summed response.
fn best_window(grid: &Grid, corners: &[LatticeCorner], pattern: PatternSize) -> Option<(i32, i32)> {
    let cols = pattern.hcount as i32;
    let rows = pattern.vcount as i32;

    let c_min = grid.keys().map(|k| k.0).min()?;
    let c_max = grid.keys().map(|k| k.0).max()?;
    let r_min = grid.keys().map(|k| k.1).min()?;
    let r_max = grid.keys().map(|k| k.1).max()?;

    let mut best: Option<((i32, i32), f64)> = None;
    for r0 in r_min..=(r_max - rows + 1) {
        for c0 in c_min..=(c_max - cols + 1) {
            let mut score = 0.0;
            let mut complete = true;
            'window: for r in r0..r0 + rows {
                for c in c0..c0 + cols {
                    match grid.get(&(c, r)) {
                        Some(&k) => score += corners[k].strength,
                        None => {
                            complete = false;
                            break 'window;
                        }
                    }
                }
            }
            if complete && best.map_or(true, |(_, s)| score > s) {
                best = Some(((c0, r0), score));
            }
        }
    }
    best.map(|(origin, _)| origin)
}

fn extract_pattern(
    grid: &Grid,
    corners: &[LatticeCorner],
    pattern: PatternSize,
) -> Option<Vec<Vector2<f64>>> {
    // Prefer the labelling whose columns are closer to horizontal
    let axis_i = mean_axis(grid, corners, (1, 0));
    let prefer_transpose = axis_i.x.abs() < axis_i.y.abs();

    for transpose in [prefer_transpose, !prefer_transpose] {
        let oriented = orient(grid, corners, transpose);
        if let Some((c0, r0)) = best_window(&oriented, corners, pattern) {
            let mut points = Vec::with_capacity(pattern.point_count());
            for r in 0..pattern.vcount as i32 {
                for c in 0..pattern.hcount as i32 {
                    let &k = oriented.get(&(c0 + c, r0 + r))?;
                    points.push(corners[k].position);
                }
            }
            return Some(points);
        }
    }
    None
}
