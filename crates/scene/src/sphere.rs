use std::collections::HashMap;
use std::f64::consts::PI;

/// Divisions used for the globe surface (32768 triangles, fits 16-bit indices).
pub const DEFAULT_SPHERE_DIVISIONS: u32 = 6;

/// Octahedron faces as raw triangle soup, north-pole faces first.
const OCTAHEDRON: [[f32; 3]; 24] = [
    [0.0, 1.0, 0.0],
    [0.0, 0.0, -1.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, -1.0],
    [0.0, -1.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 0.0, -1.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, 1.0],
    [-1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, -1.0],
    [1.0, 0.0, 0.0],
];

/// Indexed unit-sphere mesh with equirectangular texture coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SphereMesh {
    pub positions: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub indices: Vec<u16>,
}

impl SphereMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SphereError {
    TooManyVertices { divisions: u32 },
}

impl std::fmt::Display for SphereError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SphereError::TooManyVertices { divisions } => write!(
                f,
                "sphere with {divisions} divisions does not fit 16-bit indices"
            ),
        }
    }
}

impl std::error::Error for SphereError {}

fn normalized_midpoint(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    let m = [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0, (a[2] + b[2]) / 2.0];
    let len = (m[0] * m[0] + m[1] * m[1] + m[2] * m[2]).sqrt();
    [m[0] / len, m[1] / len, m[2] / len]
}

fn uv_from_point(p: [f32; 3]) -> [f64; 2] {
    let (x, y, z) = (p[0] as f64, p[1] as f64, p[2] as f64);
    [
        x.atan2(z) / (2.0 * PI) + 0.5,
        1.0 - (y.clamp(-1.0, 1.0).asin() / PI + 0.5),
    ]
}

/// Subdivides the octahedron `divisions` times and welds vertices per triangle.
///
/// Texture coordinates are fixed up per triangle before welding: pole vertices
/// take the mean U of the other two corners, and triangles spanning more than
/// half the texture horizontally have their low U values shifted by one so the
/// face does not smear across the whole map.
pub fn build_sphere(divisions: u32) -> Result<SphereMesh, SphereError> {
    // 8 faces * 4^d triangles, at most 3 new vertices each; reject early when
    // even the welded count cannot fit.
    if divisions > DEFAULT_SPHERE_DIVISIONS + 1 {
        return Err(SphereError::TooManyVertices { divisions });
    }

    let mut triangles: Vec<[[f32; 3]; 3]> = OCTAHEDRON
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect();

    for _ in 0..divisions {
        let mut next = Vec::with_capacity(triangles.len() * 4);
        for [a, b, c] in triangles {
            let ab = normalized_midpoint(a, b);
            let bc = normalized_midpoint(b, c);
            let ca = normalized_midpoint(c, a);
            next.push([a, ab, ca]);
            next.push([ab, bc, ca]);
            next.push([ab, b, bc]);
            next.push([ca, bc, c]);
        }
        triangles = next;
    }

    let mut mesh = SphereMesh::default();
    let mut welded: HashMap<String, u16> = HashMap::new();

    for tri in &triangles {
        let mut uvs = (*tri).map(uv_from_point);

        for v in 0..3 {
            if (tri[v][1] as f64).abs() > 0.999 {
                let (o1, o2) = ((v + 1) % 3, (v + 2) % 3);
                uvs[v][0] = (uvs[o1][0] + uvs[o2][0]) / 2.0;
            }
        }

        let max_u = uvs.iter().map(|uv| uv[0]).fold(f64::NEG_INFINITY, f64::max);
        let min_u = uvs.iter().map(|uv| uv[0]).fold(f64::INFINITY, f64::min);
        if max_u - min_u > 0.5 {
            for uv in uvs.iter_mut() {
                if uv[0] < 0.25 {
                    uv[0] += 1.0;
                }
            }
        }

        for (p, uv) in tri.iter().zip(uvs) {
            // `+ 0.0` folds negative zero so it welds with positive zero.
            let key = format!(
                "{:.6},{:.6},{:.6},{:.6},{:.6}",
                p[0] + 0.0,
                p[1] + 0.0,
                p[2] + 0.0,
                uv[0] + 0.0,
                uv[1] + 0.0
            );
            let index = match welded.get(&key) {
                Some(&i) => i,
                None => {
                    let i = u16::try_from(mesh.positions.len())
                        .map_err(|_| SphereError::TooManyVertices { divisions })?;
                    mesh.positions.push(*p);
                    mesh.texcoords.push([uv[0] as f32, uv[1] as f32]);
                    welded.insert(key, i);
                    i
                }
            };
            mesh.indices.push(index);
        }
    }

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_is_the_octahedron() {
        let mesh = build_sphere(0).expect("fits");
        assert_eq!(mesh.triangle_count(), 8);
        for p in &mesh.positions {
            let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn indices_stay_in_bounds_for_every_level() {
        for divisions in 0..=DEFAULT_SPHERE_DIVISIONS {
            let mesh = build_sphere(divisions).expect("fits");
            assert_eq!(mesh.triangle_count(), 8 * 4usize.pow(divisions));
            assert_eq!(mesh.positions.len(), mesh.texcoords.len());
            let n = mesh.vertex_count();
            assert!(mesh.indices.iter().all(|&i| (i as usize) < n));
        }
    }

    #[test]
    fn wide_triangles_have_no_unwrapped_u() {
        for divisions in 0..=4 {
            let mesh = build_sphere(divisions).expect("fits");
            for tri in mesh.indices.chunks_exact(3) {
                let us: Vec<f32> = tri.iter().map(|&i| mesh.texcoords[i as usize][0]).collect();
                let max = us.iter().cloned().fold(f32::MIN, f32::max);
                let min = us.iter().cloned().fold(f32::MAX, f32::min);
                if max - min > 0.5 {
                    assert!(us.iter().all(|&u| u >= 0.25), "unwrapped seam triangle {us:?}");
                }
            }
        }
    }

    #[test]
    fn seam_vertices_are_duplicated_not_shared() {
        let mesh = build_sphere(3).expect("fits");
        // Welding is per (position, uv): some positions must appear twice.
        let mut positions: Vec<String> = mesh
            .positions
            .iter()
            .map(|p| format!("{:.6},{:.6},{:.6}", p[0], p[1], p[2]))
            .collect();
        let total = positions.len();
        positions.sort();
        positions.dedup();
        assert!(positions.len() < total);
    }

    #[test]
    fn v_runs_from_north_to_south() {
        let mesh = build_sphere(1).expect("fits");
        for (p, uv) in mesh.positions.iter().zip(&mesh.texcoords) {
            if p[1] > 0.999 {
                assert!(uv[1].abs() < 1e-6);
            }
            if p[1] < -0.999 {
                assert!((uv[1] - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn oversized_request_is_rejected() {
        assert!(matches!(
            build_sphere(12),
            Err(SphereError::TooManyVertices { divisions: 12 })
        ));
    }
}
