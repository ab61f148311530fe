/// Sets every pixel whose center lies in the fan `center, polygon[i],
/// polygon[i + 1]` (closed) to 1.0. Points are in pixel units.
pub(crate) fn fill_triangle_fan(
    mask: &mut [f32],
    width: usize,
    height: usize,
    center: (f32, f32),
    polygon: &[(f32, f32)],
) {
    if polygon.len() < 2 {
        return;
    }
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        fill_triangle(mask, width, height, center, a, b);
    }
}

fn fill_triangle(
    mask: &mut [f32],
    width: usize,
    height: usize,
    v1: (f32, f32),
    v2: (f32, f32),
    v3: (f32, f32),
) {
    if width == 0 || height == 0 {
        return;
    }
    let min_x = v1.0.min(v2.0).min(v3.0).floor().max(0.0) as usize;
    let min_y = v1.1.min(v2.1).min(v3.1).floor().max(0.0) as usize;
    let max_x = v1.0.max(v2.0).max(v3.0).ceil().min((width - 1) as f32);
    let max_y = v1.1.max(v2.1).max(v3.1).ceil().min((height - 1) as f32);
    if max_x < 0.0 || max_y < 0.0 {
        return;
    }
    let (max_x, max_y) = (max_x as usize, max_y as usize);

    for y in min_y..=max_y {
        let row = &mut mask[y * width..(y + 1) * width];
        for (x, value) in row.iter_mut().enumerate().take(max_x + 1).skip(min_x) {
            if point_in_triangle(x as f32 + 0.5, y as f32 + 0.5, v1, v2, v3) {
                *value = 1.0;
            }
        }
    }
}

fn point_in_triangle(px: f32, py: f32, v1: (f32, f32), v2: (f32, f32), v3: (f32, f32)) -> bool {
    fn sign(px: f32, py: f32, a: (f32, f32), b: (f32, f32)) -> f32 {
        (px - b.0) * (a.1 - b.1) - (a.0 - b.0) * (py - b.1)
    }

    let d1 = sign(px, py, v1, v2);
    let d2 = sign(px, py, v2, v3);
    let d3 = sign(px, py, v3, v1);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}
