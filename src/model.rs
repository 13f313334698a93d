use serde::{Deserialize, Deserializer};

use crate::engine::{EngineError, NumericEngine, ObjectHandle};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("malformed model JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("face {face} has {count} vertices, at least 3 are required")]
    FaceArity { face: usize, count: usize },

    #[error("face {face} has a vertex without a position index")]
    MissingVertexIndex { face: usize },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A JSON value the mesh server may send as a number or as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
}

impl Lenient {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Lenient::Number(n) => Some(*n),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn lenient_f32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = Option::<Lenient>::deserialize(deserializer)?;
    match value {
        None => Ok(0.0),
        Some(raw) => raw
            .as_f64()
            .map(|n| n as f32)
            .ok_or_else(|| serde::de::Error::custom("expected a number")),
    }
}

/// Empty strings and nulls count as absent.
fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<Lenient>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(Lenient::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(raw) => match raw.as_f64() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => Ok(Some(n as u32)),
            _ => Err(serde::de::Error::custom("expected a non-negative integer index")),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    #[serde(deserialize_with = "lenient_f32")]
    pub x: f32,
    #[serde(deserialize_with = "lenient_f32")]
    pub y: f32,
    #[serde(default, deserialize_with = "lenient_f32")]
    pub z: f32,
}

/// One face corner; indices are 1-based as in OBJ.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FaceVertex {
    #[serde(default, deserialize_with = "lenient_index")]
    pub v: Option<u32>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub vt: Option<u32>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub vn: Option<u32>,
}

impl FaceVertex {
    /// Zero-based `[v, vt, vn]`; a missing `vt`/`vn` means the first entry.
    fn zero_based(&self, face: usize) -> Result<[u32; 3], ModelError> {
        let v = match self.v {
            Some(v) if v > 0 => v - 1,
            _ => return Err(ModelError::MissingVertexIndex { face }),
        };
        let vt = self.vt.unwrap_or(1).saturating_sub(1);
        let vn = self.vn.unwrap_or(1).saturating_sub(1);
        Ok([v, vt, vn])
    }
}

/// Mesh as served by `/raw/model`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelData {
    #[serde(default)]
    pub v: Vec<Coordinates>,
    #[serde(default)]
    pub vn: Vec<Coordinates>,
    #[serde(default)]
    pub vt: Vec<Coordinates>,
    #[serde(default)]
    pub f: Vec<Vec<FaceVertex>>,
}

impl ModelData {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Number of triangles after fan triangulation.
    pub fn triangle_count(&self) -> usize {
        self.f.iter().map(|face| face.len().saturating_sub(2)).sum()
    }

    /// Feeds the mesh into `engine`. Faces with more than three corners are
    /// split into a fan around their first corner.
    pub fn load_into(
        &self,
        engine: &mut dyn NumericEngine,
        object: ObjectHandle,
    ) -> Result<(), ModelError> {
        for p in &self.v {
            engine.add_vertex(object, p.x, p.y, p.z);
        }
        for n in &self.vn {
            engine.add_vertex_normal(object, n.x, n.y, n.z);
        }
        for t in &self.vt {
            engine.add_texture_vertex(object, t.x, t.y, t.z);
        }

        for (face, corners) in self.f.iter().enumerate() {
            if corners.len() < 3 {
                return Err(ModelError::FaceArity {
                    face,
                    count: corners.len(),
                });
            }
            let first = corners[0].zero_based(face)?;
            for pair in corners[1..].windows(2) {
                let b = pair[0].zero_based(face)?;
                let c = pair[1].zero_based(face)?;
                let mut indices = [0u32; 9];
                indices[..3].copy_from_slice(&first);
                indices[3..6].copy_from_slice(&b);
                indices[6..].copy_from_slice(&c);
                engine.add_face(object, indices)?;
            }
        }

        log::info!(
            "loaded model: {} vertices, {} normals, {} texcoords, {} triangles",
            self.v.len(),
            self.vn.len(),
            self.vt.len(),
            self.triangle_count()
        );
        Ok(())
    }
}
