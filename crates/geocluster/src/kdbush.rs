//! Static 2D KD index over points.
//!
//! The index is built once and never mutated. Points are stored in a single
//! array ordered as an implicit KD tree: the median of each range splits it on
//! alternating axes until a range holds at most `node_size` points.

/// A static spatial index for 2D points.
#[derive(Debug, Clone)]
pub struct KdBush {
    node_size: usize,
    /// `(id, [x, y])` pairs in KD order. Ids are positions in the input.
    entries: Vec<(usize, [f64; 2])>,
}

impl KdBush {
    /// Build an index over `points`. Query results refer to points by their
    /// position in this iterator.
    pub fn new(points: impl IntoIterator<Item = [f64; 2]>, node_size: usize) -> Self {
        let mut index = Self {
            node_size: node_size.max(1),
            entries: points.into_iter().enumerate().collect(),
        };
        if !index.entries.is_empty() {
            let right = index.entries.len() - 1;
            index.sort(0, right, 0);
        }
        index
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no points.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sort(&mut self, left: usize, right: usize, axis: usize) {
        if right - left <= self.node_size {
            return;
        }

        let m = (left + right) / 2;
        self.entries[left..=right]
            .select_nth_unstable_by(m - left, |a, b| a.1[axis].total_cmp(&b.1[axis]));

        self.sort(left, m - 1, 1 - axis);
        self.sort(m + 1, right, 1 - axis);
    }

    /// Ids of all points inside the axis-aligned box (inclusive bounds).
    pub fn range(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<usize> {
        let inside = |p: [f64; 2]| p[0] >= min_x && p[0] <= max_x && p[1] >= min_y && p[1] <= max_y;
        let mins = [min_x, min_y];
        let maxs = [max_x, max_y];
        self.search(inside, mins, maxs)
    }

    /// Ids of all points within `radius` of `(qx, qy)`.
    pub fn within(&self, qx: f64, qy: f64, radius: f64) -> Vec<usize> {
        let r2 = radius * radius;
        let inside = |p: [f64; 2]| {
            let dx = p[0] - qx;
            let dy = p[1] - qy;
            dx * dx + dy * dy <= r2
        };
        let mins = [qx - radius, qy - radius];
        let maxs = [qx + radius, qy + radius];
        self.search(inside, mins, maxs)
    }

    /// Walk the implicit tree, pruning subtrees outside `[mins, maxs]` and
    /// collecting ids accepted by `inside`.
    fn search(&self, inside: impl Fn([f64; 2]) -> bool, mins: [f64; 2], maxs: [f64; 2]) -> Vec<usize> {
        let mut result = Vec::new();
        if self.entries.is_empty() {
            return result;
        }

        let mut stack = vec![(0, self.entries.len() - 1, 0usize)];
        while let Some((left, right, axis)) = stack.pop() {
            if right - left <= self.node_size {
                result.extend(
                    self.entries[left..=right]
                        .iter()
                        .filter(|(_, p)| inside(*p))
                        .map(|(id, _)| *id),
                );
                continue;
            }

            let m = (left + right) / 2;
            let (id, p) = self.entries[m];
            if inside(p) {
                result.push(id);
            }

            if mins[axis] <= p[axis] {
                stack.push((left, m - 1, 1 - axis));
            }
            if maxs[axis] >= p[axis] {
                stack.push((m + 1, right, 1 - axis));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random points in [0, 1)².
    fn scatter(count: usize) -> Vec<[f64; 2]> {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..count).map(|_| [next(), next()]).collect()
    }

    fn sorted(mut ids: Vec<usize>) -> Vec<usize> {
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_range_matches_brute_force() {
        let points = scatter(500);
        let index = KdBush::new(points.iter().copied(), 8);
        assert_eq!(index.len(), 500);

        let (min_x, min_y, max_x, max_y) = (0.2, 0.3, 0.55, 0.9);
        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p[0] >= min_x && p[0] <= max_x && p[1] >= min_y && p[1] <= max_y)
            .map(|(i, _)| i)
            .collect();

        assert_eq!(sorted(index.range(min_x, min_y, max_x, max_y)), expected);
    }

    #[test]
    fn test_within_matches_brute_force() {
        let points = scatter(500);
        let index = KdBush::new(points.iter().copied(), 4);

        for (qx, qy, r) in [(0.5, 0.5, 0.1), (0.0, 0.0, 0.3), (0.9, 0.1, 0.05)] {
            let expected: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| (p[0] - qx).powi(2) + (p[1] - qy).powi(2) <= r * r)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(sorted(index.within(qx, qy, r)), expected);
        }
    }

    #[test]
    fn test_empty_and_tiny_indices() {
        let empty = KdBush::new(std::iter::empty(), 16);
        assert!(empty.is_empty());
        assert!(empty.range(0.0, 0.0, 1.0, 1.0).is_empty());

        let single = KdBush::new([[0.5, 0.5]], 16);
        assert_eq!(single.within(0.5, 0.5, 0.0), vec![0]);
        assert!(single.within(0.0, 0.0, 0.1).is_empty());
    }

    #[test]
    fn test_duplicate_points_are_all_returned() {
        let index = KdBush::new(vec![[0.25, 0.25]; 40], 2);
        assert_eq!(sorted(index.within(0.25, 0.25, 0.01)), (0..40).collect::<Vec<_>>());
    }
}
