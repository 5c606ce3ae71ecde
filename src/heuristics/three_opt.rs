//! 3-opt route improvement, plain and neighbor-list restricted.
//!
//! Both variants work on the cyclic view of the route: an (x < y < z) cut
//! splits it into three segments, and each reconnection pattern is encoded
//! by the three new edges it creates plus the segments it reverses. The
//! longest segment is never touched; the other two are reversed in place
//! and, when needed, swapped around it with wrapped rotations. Since moves
//! may shift the depot, the route is rotated back so the depot ends up at
//! index 0.

use crate::instance::Instance;
use crate::solution::Solution;

/// A fragment of the cyclic route: indices `first..=last`, possibly
/// wrapping past the end of the underlying vector.
#[derive(Debug, Clone, Copy)]
struct Segment {
    /// Index of the first element of the segment.
    first: usize,
    /// Index of the last element of the segment.
    last: usize,
    /// Length of the whole route.
    len: usize,
    /// Segment id (0..=2) within the 3-opt cut.
    id: usize,
    /// Marks that the element order within the segment should be reversed.
    reversed: bool,
}

impl Segment {
    fn new(first: usize, last: usize, len: usize, id: usize) -> Self {
        Segment {
            first,
            last,
            len,
            id,
            reversed: false,
        }
    }

    /// Number of elements covered by the segment.
    fn size(&self) -> usize {
        let (first, last) = if self.reversed {
            (self.last, self.first)
        } else {
            (self.first, self.last)
        };
        if first <= last {
            last - first + 1
        } else {
            self.len - first + last + 1
        }
    }

    /// Flips the orientation marker, swapping the endpoints.
    fn reverse(&mut self) {
        std::mem::swap(&mut self.first, &mut self.last);
        self.reversed = !self.reversed;
    }
}

/// Reverses `count` elements of the cyclic window starting at `start`.
fn reverse_wrapped(route: &mut [usize], start: usize, count: usize) {
    let len = route.len();
    for step in 0..count / 2 {
        let a = (start + step) % len;
        let b = (start + count - 1 - step) % len;
        route.swap(a, b);
    }
}

/// Left-rotates the cyclic window of `count` elements starting at `start`
/// so that the element at offset `mid` becomes its first element.
fn rotate_wrapped(route: &mut [usize], start: usize, mid: usize, count: usize) {
    if mid == 0 || mid >= count {
        return;
    }
    let len = route.len();
    reverse_wrapped(route, start, mid);
    reverse_wrapped(route, (start + mid) % len, count - mid);
    reverse_wrapped(route, start, count);
}

/// Applies a 2-opt move that removes edges (i, i+1) and (j, j+1),
/// reversing the shorter of the two segments the cut creates.
pub(crate) fn perform_2_opt_move(route: &mut [usize], mut i: usize, mut j: usize) {
    let len = route.len();
    if i > j {
        std::mem::swap(&mut i, &mut j);
    }
    let i_1 = (i + 1) % len;
    let j_1 = (j + 1) % len;
    let s1 = Segment::new(i_1, j, len, 0);
    let s2 = Segment::new(j_1, i, len, 0);
    if s1.size() < s2.size() {
        route[s1.first..s1.first + s1.size()].reverse();
    } else {
        reverse_wrapped(route, s2.first, s2.size());
    }
}

/// Performs the route modifications required by a 3-opt move: segment
/// reversals and, when the kept segment is the marked one, a swap of the
/// remaining two. Symmetric travel costs only.
fn perform_3_opt_move(route: &mut [usize], mut s0: Segment, mut s1: Segment, mut s2: Segment) {
    use std::mem::swap;

    // Sort the segments so the longest comes first; it stays untouched.
    if s0.size() < s1.size() {
        swap(&mut s0, &mut s1);
    }
    if s0.size() < s2.size() {
        swap(&mut s0, &mut s2);
    }
    if s1.size() < s2.size() {
        swap(&mut s1, &mut s2);
    }
    debug_assert!(s0.size() >= s1.size() && s1.size() >= s2.size());

    let mut swap_needed = false;

    // Instead of reversing the longest segment, reverse the other two and
    // swap them.
    if s0.reversed {
        s1.reverse();
        s2.reverse();
        swap_needed = true;
    }
    if s1.reversed {
        s1.reverse();
        reverse_wrapped(route, s1.first, s1.size());
    }
    if s2.reversed {
        s2.reverse();
        reverse_wrapped(route, s2.first, s2.size());
    }
    if swap_needed {
        if s1.id == 2 && s2.id == 1 {
            // Both segments are contiguous and adjacent.
            route[s2.first..=s1.last].rotate_left(s1.first - s2.first);
        } else if s1.id == 1 && s2.id == 2 {
            route[s1.first..=s2.last].rotate_left(s2.first - s1.first);
        } else {
            let (left, middle) = if (s1.id == 0 && s2.id == 2) || (s1.id == 1 && s2.id == 0) {
                (s2.first, s2.size())
            } else {
                (s1.first, s1.size())
            };
            rotate_wrapped(route, left, middle, s1.size() + s2.size());
        }
    }
}

/// Which of the three segments each reconnection pattern reverses.
const SEGMENT_REVERSALS: [[bool; 3]; 4] = [
    [false, true, true],
    [true, true, true],
    [true, true, false],
    [true, false, true],
];

/// Tries the four non-2-opt reconnection patterns for the sorted position
/// triple (x < y < z); applies the first one that shortens the route and
/// clears the don't-look bits of every endpoint of the new edges. Returns
/// true if a move was applied.
fn apply_best_reconnection(
    instance: &Instance,
    route: &mut [usize],
    dont_look: &mut [bool],
    x: usize,
    y: usize,
    z: usize,
) -> bool {
    let len = route.len();
    let x_1 = (x + 1) % len;
    let y_1 = (y + 1) % len;
    let z_1 = (z + 1) % len;

    let at_x = route[x];
    let at_x_1 = route[x_1];
    let at_y = route[y];
    let at_y_1 = route[y_1];
    let at_z = route[z];
    let at_z_1 = route[z_1];

    let curr = instance.travel_cost(at_x, at_x_1)
        + instance.travel_cost(at_y, at_y_1)
        + instance.travel_cost(at_z, at_z_1);

    // The four sets of new edges each pattern creates.
    let patterns: [[(usize, usize); 3]; 4] = [
        [(at_y, at_x), (at_z_1, at_y_1), (at_z, at_x_1)],
        [(at_y, at_z_1), (at_x, at_y_1), (at_z, at_x_1)],
        [(at_y, at_z_1), (at_x, at_z), (at_y_1, at_x_1)],
        [(at_y, at_z), (at_y_1, at_x), (at_z_1, at_x_1)],
    ];

    for (edges, reversals) in patterns.iter().zip(SEGMENT_REVERSALS.iter()) {
        let cost = edges
            .iter()
            .map(|&(a, b)| instance.travel_cost(a, b))
            .sum::<i32>();
        if cost < curr {
            let mut segments = [
                Segment::new(z_1, x, len, 0),
                Segment::new(x_1, y, len, 1),
                Segment::new(y_1, z, len, 2),
            ];
            for (segment, &reverse) in segments.iter_mut().zip(reversals.iter()) {
                if reverse {
                    segment.reverse();
                }
            }
            for &(a, b) in edges {
                dont_look[a] = false;
                dont_look[b] = false;
            }
            perform_3_opt_move(route, segments[0], segments[1], segments[2]);
            return true;
        }
    }
    false
}

/// Moves the depot back to index 0 after segment moves shifted it.
fn rotate_depot_to_front(route: &mut [usize]) {
    if let Some(pos) = route.iter().position(|&m| m == 0) {
        if pos > 0 {
            route.rotate_left(pos);
        }
    }
}

/// Full 3-opt: scans every ordered position triple for an improving
/// reconnection until none is left. Returns the travel-cost improvement.
pub fn three_opt(instance: &Instance, sol: &mut Solution, use_dont_look_bits: bool) -> i32 {
    assert!(instance.is_symmetric, "Symmetric instance expected");

    let len = sol.route.len();
    if len < 4 {
        return 0;
    }
    let old_travel_cost = instance.route_travel_cost(&sol.route);
    let mut dont_look = vec![false; instance.dimension];

    loop {
        let mut found_improvement = false;
        'scan: for i in 0..len - 2 {
            if dont_look[sol.route[i]] {
                continue;
            }
            for j in i + 1..len - 1 {
                for k in j + 1..len {
                    if apply_best_reconnection(instance, &mut sol.route, &mut dont_look, i, j, k) {
                        found_improvement = true;
                        break 'scan;
                    }
                }
            }
            if use_dont_look_bits {
                dont_look[sol.route[i]] = true;
            }
        }
        if !found_improvement {
            break;
        }
    }

    rotate_depot_to_front(&mut sol.route);
    let new_travel_cost = instance.route_travel_cost(&sol.route);
    let delta = new_travel_cost - old_travel_cost;
    assert!(delta <= 0, "Travel cost should not grow");
    sol.cost += delta;
    sol.travel_cost += delta;
    log::info!("3-opt improvement: {}", -delta);
    -delta
}

/// Neighbor-list 3-opt: inner pairs are restricted to each node's first
/// `nn_count` nearest neighbors, and a candidate pair yielding a plain
/// 2-opt gain is applied as such before any 3-opt pattern is tried.
/// Returns the travel-cost improvement.
pub fn three_opt_nn(
    instance: &Instance,
    sol: &mut Solution,
    use_dont_look_bits: bool,
    nn_count: usize,
) -> i32 {
    assert!(instance.is_symmetric, "Symmetric instance expected");

    let len = sol.route.len();
    if len < 4 {
        return 0;
    }
    let old_travel_cost = instance.route_travel_cost(&sol.route);
    let mut dont_look = vec![false; instance.dimension];
    let mut pos_in_route = vec![len; instance.dimension];

    loop {
        let mut found_improvement = false;

        pos_in_route.iter_mut().for_each(|p| *p = len);
        for (i, &market) in sol.route.iter().enumerate() {
            pos_in_route[market] = i;
        }

        'scan: for i in 0..len {
            let at_i = sol.route[i];
            if dont_look[at_i] {
                continue;
            }
            let i_nn_list = &instance.nn_lists[at_i];
            let i_nn_count = nn_count.min(i_nn_list.len());

            for &at_j in &i_nn_list[..i_nn_count] {
                let j = pos_in_route[at_j];
                if j == len {
                    continue; // Not in the route.
                }

                // A 2-opt gain on this pair takes precedence.
                let i_1 = (i + 1) % len;
                let j_1 = (j + 1) % len;
                let at_i_1 = sol.route[i_1];
                let at_j_1 = sol.route[j_1];
                let change_2opt = instance.travel_cost(at_i, at_i_1)
                    + instance.travel_cost(at_j, at_j_1)
                    - instance.travel_cost(at_i, at_j)
                    - instance.travel_cost(at_i_1, at_j_1);
                if change_2opt > 0 {
                    let cost_before = instance.route_travel_cost(&sol.route);
                    perform_2_opt_move(&mut sol.route, i, j);
                    let cost_after = instance.route_travel_cost(&sol.route);
                    debug_assert!(cost_after < cost_before);
                    debug_assert_eq!(change_2opt + cost_after, cost_before);

                    dont_look[at_i] = false;
                    dont_look[at_i_1] = false;
                    dont_look[at_j] = false;
                    dont_look[at_j_1] = false;
                    found_improvement = true;
                    break 'scan;
                }

                let j_nn_list = &instance.nn_lists[at_j];
                let j_nn_count = nn_count.min(j_nn_list.len());
                debug_assert_ne!(at_i, at_j);

                for &at_k in &j_nn_list[..j_nn_count] {
                    let k = pos_in_route[at_k];
                    if k == len || k == i {
                        continue;
                    }

                    let (mut x, mut y, mut z) = (i, j, k);
                    if x > y {
                        std::mem::swap(&mut x, &mut y);
                    }
                    if x > z {
                        std::mem::swap(&mut x, &mut z);
                    }
                    if y > z {
                        std::mem::swap(&mut y, &mut z);
                    }

                    if apply_best_reconnection(instance, &mut sol.route, &mut dont_look, x, y, z) {
                        found_improvement = true;
                        break 'scan;
                    }
                }
            }
            if use_dont_look_bits {
                dont_look[sol.route[i]] = true;
            }
        }
        if !found_improvement {
            break;
        }
    }

    rotate_depot_to_front(&mut sol.route);
    let new_travel_cost = instance.route_travel_cost(&sol.route);
    let delta = new_travel_cost - old_travel_cost;
    assert!(delta <= 0, "Travel cost should not grow");
    sol.cost += delta;
    sol.travel_cost += delta;
    log::info!("3-opt improvement: {}", -delta);
    -delta
}
