use crate::layout::LaneLayout;

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const CLOTH_TOP: [u8; 4] = [255, 255, 255, 255];
const CLOTH_BOTTOM: [u8; 4] = [150, 170, 205, 255];

#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
        255,
    ]
}

/// Draw the cloth as line segments: every point to its +x and +y neighbor for
/// columns 1..N-2, plus the vertical seam at column N-2. Positions are read
/// by logical coordinate through the layout's index map.
pub fn render_cloth(layout: &LaneLayout, width: usize, height: usize) -> Vec<u8> {
    let mut canvas = Canvas::new(width, height);
    let n = layout.map.width;
    let rows = layout.map.height;
    if n < 3 || rows < 2 {
        return canvas.rgba;
    }

    for y in 0..rows - 1 {
        let color = lerp_color(CLOTH_TOP, CLOTH_BOTTOM, y as f32 / (rows - 1) as f32);
        for x in 1..n - 2 {
            let p = layout.position(x, y);
            canvas.line(p, layout.position(x + 1, y), color);
            canvas.line(p, layout.position(x, y + 1), color);
        }
        canvas.line(layout.position(n - 2, y), layout.position(n - 2, y + 1), color);
    }
    canvas.rgba
}

struct Canvas {
    w: usize,
    h: usize,
    rgba: Vec<u8>,
}

impl Canvas {
    fn new(w: usize, h: usize) -> Self {
        let mut rgba = vec![0u8; w * h * 4];
        for px in rgba.chunks_exact_mut(4) {
            px.copy_from_slice(&BACKGROUND);
        }
        Self { w, h, rgba }
    }

    fn line(&mut self, a: [f32; 2], b: [f32; 2], color: [u8; 4]) {
        // Exploded points are simply not drawn.
        if !(a[0].is_finite() && a[1].is_finite() && b[0].is_finite() && b[1].is_finite()) {
            return;
        }
        let Some((a, b)) = clip(a, b, self.w as f32, self.h as f32) else {
            return;
        };
        let dx = b[0] - a[0];
        let dy = b[1] - a[1];
        let steps = dx.abs().max(dy.abs()).ceil() as usize;
        for i in 0..=steps {
            let t = if steps == 0 { 0.0 } else { i as f32 / steps as f32 };
            let x = (a[0] + dx * t).round() as usize;
            let y = (a[1] + dy * t).round() as usize;
            if x < self.w && y < self.h {
                let i = (y * self.w + x) * 4;
                self.rgba[i..i + 4].copy_from_slice(&color);
            }
        }
    }
}

/// Clip segment a-b to the pixel rectangle [0, w-1] x [0, h-1] (Liang-Barsky).
fn clip(a: [f32; 2], b: [f32; 2], w: f32, h: f32) -> Option<([f32; 2], [f32; 2])> {
    if w < 1.0 || h < 1.0 {
        return None;
    }
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    for (p, q) in [
        (-dx, a[0]),
        (dx, w - 1.0 - a[0]),
        (-dy, a[1]),
        (dy, h - 1.0 - a[1]),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
    }
    Some((
        [a[0] + t0 * dx, a[1] + t0 * dy],
        [a[0] + t1 * dx, a[1] + t1 * dy],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Params;
    use crate::layout::to_lane_layout;
    use crate::model::initialize;

    fn pixel(rgba: &[u8], w: usize, x: usize, y: usize) -> [u8; 4] {
        let i = (y * w + x) * 4;
        [rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]]
    }

    fn flat(n: usize) -> LaneLayout {
        let params = Params {
            grid_size: n,
            jitter: 0.0,
            ..Params::default()
        };
        to_lane_layout(&initialize(&params).unwrap(), params.effective_lanes()).unwrap()
    }

    #[test]
    fn draws_horizontal_links_from_column_one() {
        // 4x4: x spacing 295, so (1, 0) -> (2, 0) spans x 305..600 on row 10.
        let rgba = render_cloth(&flat(4), 1280, 720);
        assert_eq!(pixel(&rgba, 1280, 450, 10), CLOTH_TOP);
        // column 0 links are not drawn
        assert_eq!(pixel(&rgba, 1280, 150, 10), BACKGROUND);
        assert_eq!(pixel(&rgba, 1280, 1200, 700), BACKGROUND);
    }

    #[test]
    fn draws_the_seam_at_column_n_minus_two() {
        let rgba = render_cloth(&flat(4), 1280, 720);
        // (2, 0) -> (2, 1): x from 600 to 600.9, y from 10 to 145.
        assert_ne!(pixel(&rgba, 1280, 600, 60), BACKGROUND);
    }

    #[test]
    fn skips_non_finite_and_clips_far_points() {
        let mut l = flat(12);
        let s = l.map.slot(3, 3);
        l.pos_x[s] = f32::NAN;
        let s = l.map.slot(5, 5);
        l.pos_x[s] = 1.0e9;
        l.pos_y[s] = -1.0e9;
        let rgba = render_cloth(&l, 320, 200);
        assert_eq!(rgba.len(), 320 * 200 * 4);
    }

    #[test]
    fn clip_keeps_inside_segments_and_drops_outside_ones() {
        assert_eq!(
            clip([1.0, 1.0], [5.0, 5.0], 10.0, 10.0),
            Some(([1.0, 1.0], [5.0, 5.0]))
        );
        assert_eq!(clip([-5.0, -5.0], [-1.0, -1.0], 10.0, 10.0), None);
        let (a, b) = clip([-10.0, 5.0], [20.0, 5.0], 10.0, 10.0).unwrap();
        assert!(a[0].abs() < 1e-4 && a[1] == 5.0);
        assert!((b[0] - 9.0).abs() < 1e-4 && b[1] == 5.0);
    }
}
