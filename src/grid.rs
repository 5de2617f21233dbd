/// Row-major flat grid, indexed `x + y * w`.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub w: usize,
    pub h: usize,
}

impl<T: Copy + Default> Grid<T> {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            data: vec![T::default(); w * h],
            w,
            h,
        }
    }
}

impl<T> Grid<T> {
    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.w && y < self.h);
        y * self.w + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let i = self.idx(x, y);
        &mut self.data[i]
    }

    #[inline]
    pub fn is_interior(&self, x: usize, y: usize) -> bool {
        x >= 1 && y >= 1 && x + 1 < self.w && y + 1 < self.h
    }
}

/// The four constraint links, in processing order: +x, -x, +y, -y.
pub const LINKS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Neighbor across `link`, or None when it falls outside the grid.
#[inline]
pub fn neighbor(x: usize, y: usize, link: usize, w: usize, h: usize) -> Option<(usize, usize)> {
    let (dx, dy) = LINKS[link];
    let nx = x as i64 + dx as i64;
    let ny = y as i64 + dy as i64;
    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
        return None;
    }
    Some((nx as usize, ny as usize))
}

/// 4-connected neighbors, clipped at the border.
pub fn neighbors4(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..LINKS.len()).filter_map(move |link| neighbor(x, y, link, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_has_two_neighbors_interior_has_four() {
        assert_eq!(neighbors4(0, 0, 4, 4).count(), 2);
        assert_eq!(neighbors4(3, 1, 4, 4).count(), 3);
        let mut n: Vec<_> = neighbors4(1, 2, 4, 4).collect();
        n.sort();
        assert_eq!(n, vec![(0, 2), (1, 1), (1, 3), (2, 2)]);
    }

    #[test]
    fn interior_excludes_outer_ring() {
        let g: Grid<u8> = Grid::new(4, 4);
        assert!(g.is_interior(1, 1));
        assert!(g.is_interior(2, 2));
        assert!(!g.is_interior(0, 2));
        assert!(!g.is_interior(3, 2));
        assert!(!g.is_interior(2, 3));
    }
}
