use nalgebra::Vector2;

use crate::frame::Mask;

/// A connected foreground region pulled out of a mask. Lives only for
/// the duration of one update cycle.
#[derive(Debug, Clone)]
pub struct BlobCandidate {
    /// Coordinates of every pixel in the region.
    pub pixels: Vec<(u32, u32)>,
    /// Pixel count.
    pub area: usize,
    /// First-order-moment centroid: (Σx / area, Σy / area).
    pub centroid: Vector2<f64>,
}

/// Extract all maximal 8-connected foreground regions from `mask`,
/// ordered by the scan position of their first pixel.
///
/// An empty mask yields an empty vector; a single-pixel region is a
/// valid candidate whose centroid is that pixel.
pub fn find_blobs(mask: &Mask) -> Vec<BlobCandidate> {
    let (w, h) = (mask.width(), mask.height());
    let mut visited = vec![false; w * h];
    let mut blobs = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) || visited[y * w + x] {
                continue;
            }
            visited[y * w + x] = true;
            stack.push((x, y));

            let mut pixels = Vec::new();
            let mut sum_x = 0u64;
            let mut sum_y = 0u64;
            while let Some((px, py)) = stack.pop() {
                pixels.push((px as u32, py as u32));
                sum_x += px as u64;
                sum_y += py as u64;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = px as i64 + dx;
                        let ny = py as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let (nx, ny) = (nx as usize, ny as usize);
                        if mask.get(nx, ny) && !visited[ny * w + nx] {
                            visited[ny * w + nx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            let area = pixels.len();
            let centroid = Vector2::new(sum_x as f64 / area as f64, sum_y as f64 / area as f64);
            blobs.push(BlobCandidate {
                pixels,
                area,
                centroid,
            });
        }
    }
    blobs
}
