//! `sphere.bin`: a pre-baked [`SphereMesh`] so clients can skip tessellation.
//!
//! Layout (little-endian):
//! - 12-byte header: byte lengths of the positions, texcoords and indices
//!   sections as three `u32`
//! - positions as `f32` xyz triples
//! - texcoords as `f32` uv pairs
//! - indices as `u16`

use std::io::{Read, Write};

use scene::SphereMesh;

const HEADER_LEN: usize = 12;

#[derive(Debug)]
pub enum SphereBinError {
    Io { context: &'static str, source: std::io::Error },
    Truncated { needed: usize, available: usize },
    /// A section length is not a whole number of elements, or sections disagree.
    Malformed(String),
}

impl std::fmt::Display for SphereBinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SphereBinError::Io { context, source } => write!(f, "{context}: {source}"),
            SphereBinError::Truncated { needed, available } => {
                write!(f, "sphere.bin truncated: need {needed} bytes, have {available}")
            }
            SphereBinError::Malformed(msg) => write!(f, "malformed sphere.bin: {msg}"),
        }
    }
}

impl std::error::Error for SphereBinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SphereBinError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn section_len(count: usize, elem_bytes: usize) -> Result<u32, SphereBinError> {
    u32::try_from(count * elem_bytes)
        .map_err(|_| SphereBinError::Malformed("section exceeds 4 GiB".to_string()))
}

pub fn encode(mesh: &SphereMesh) -> Result<Vec<u8>, SphereBinError> {
    let mut out = Vec::new();
    encode_to_writer(mesh, &mut out)?;
    Ok(out)
}

pub fn encode_to_writer<W: Write>(mesh: &SphereMesh, w: &mut W) -> Result<(), SphereBinError> {
    let io = |source: std::io::Error| SphereBinError::Io { context: "write sphere.bin", source };

    let lens = [
        section_len(mesh.positions.len(), 12)?,
        section_len(mesh.texcoords.len(), 8)?,
        section_len(mesh.indices.len(), 2)?,
    ];
    for len in lens {
        w.write_all(&len.to_le_bytes()).map_err(io)?;
    }
    for v in mesh.positions.iter().flatten().chain(mesh.texcoords.iter().flatten()) {
        w.write_all(&v.to_le_bytes()).map_err(io)?;
    }
    for i in &mesh.indices {
        w.write_all(&i.to_le_bytes()).map_err(io)?;
    }
    Ok(())
}

pub fn decode_from_reader<R: Read>(r: &mut R) -> Result<SphereMesh, SphereBinError> {
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes).map_err(|source| SphereBinError::Io {
        context: "read sphere.bin",
        source,
    })?;
    decode(&bytes)
}

pub fn decode(bytes: &[u8]) -> Result<SphereMesh, SphereBinError> {
    if bytes.len() < HEADER_LEN {
        return Err(SphereBinError::Truncated {
            needed: HEADER_LEN,
            available: bytes.len(),
        });
    }
    let header: Vec<usize> = bytes[..HEADER_LEN]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as usize)
        .collect();
    let (pos_len, uv_len, idx_len) = (header[0], header[1], header[2]);

    if pos_len % 12 != 0 || uv_len % 8 != 0 || idx_len % 2 != 0 {
        return Err(SphereBinError::Malformed(format!(
            "section lengths {pos_len}/{uv_len}/{idx_len} are not whole elements"
        )));
    }
    if pos_len / 12 != uv_len / 8 {
        return Err(SphereBinError::Malformed(
            "position and texcoord counts differ".to_string(),
        ));
    }

    let needed = HEADER_LEN + pos_len + uv_len + idx_len;
    if bytes.len() < needed {
        return Err(SphereBinError::Truncated {
            needed,
            available: bytes.len(),
        });
    }

    let body = &bytes[HEADER_LEN..needed];
    let (pos_bytes, rest) = body.split_at(pos_len);
    let (uv_bytes, idx_bytes) = rest.split_at(uv_len);

    let floats = |b: &[u8]| -> Vec<f32> {
        b.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    };

    let positions = floats(pos_bytes)
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect::<Vec<_>>();
    let texcoords = floats(uv_bytes)
        .chunks_exact(2)
        .map(|t| [t[0], t[1]])
        .collect();
    let indices: Vec<u16> = idx_bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
        return Err(SphereBinError::Malformed(format!(
            "index {bad} out of range for {} vertices",
            positions.len()
        )));
    }

    Ok(SphereMesh {
        positions,
        texcoords,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene::build_sphere;

    #[test]
    fn header_records_section_byte_lengths() {
        let mesh = build_sphere(1).expect("sphere");
        let bytes = encode(&mesh).expect("encode");
        let len = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap()) as usize;
        assert_eq!(len(0), mesh.vertex_count() * 12);
        assert_eq!(len(1), mesh.vertex_count() * 8);
        assert_eq!(len(2), mesh.indices.len() * 2);
        assert_eq!(bytes.len(), 12 + len(0) + len(1) + len(2));

        assert_eq!(decode(&bytes).expect("decode"), mesh);
    }

    #[test]
    fn truncated_input_is_reported() {
        let mesh = build_sphere(0).expect("sphere");
        let bytes = encode(&mesh).expect("encode");
        let err = decode(&bytes[..bytes.len() - 1]).expect_err("truncated");
        assert!(matches!(err, SphereBinError::Truncated { .. }));
        assert!(matches!(decode(&[0u8; 4]), Err(SphereBinError::Truncated { needed: 12, .. })));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mesh = SphereMesh {
            positions: vec![[0.0, 1.0, 0.0]],
            texcoords: vec![[0.5, 0.0]],
            indices: vec![0, 0, 3],
        };
        let bytes = encode(&mesh).expect("encode");
        assert!(matches!(decode(&bytes), Err(SphereBinError::Malformed(_))));
    }
}
