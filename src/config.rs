//! Configuration of a background mesh.

use crate::algs::communicator::CommTag;
use crate::forest::MAX_LEVEL;
use crate::mesh_error::MeshError;
use crate::topology::dimension::Dimension;
use crate::topology::tables::MAX_STENCIL_ORDER;

/// Parameters of a [`BackgroundMesh`](crate::mesh::BackgroundMesh).
///
/// The dimensionality is the length of `elements_per_dimension`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshConfig {
    /// Level-0 cells per axis of the real (unpadded) domain.
    pub elements_per_dimension: Vec<u64>,
    /// Layers of padding cells added around the domain on every side.
    pub padding_size: u64,
    /// Same-level neighborhood order refined around every flagged cell (0 disables).
    pub refinement_buffer: usize,
    pub max_refinement_level: u8,
    /// Number of activation patterns carried by every cell.
    pub activation_patterns: usize,
    /// Process grid; derived from the rank count when absent.
    pub proc_dims: Option<Vec<usize>>,
    /// First message tag used by synchronization rounds.
    pub sync_tag_base: u16,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            elements_per_dimension: vec![4, 4],
            padding_size: 0,
            refinement_buffer: 1,
            max_refinement_level: 10,
            activation_patterns: 1,
            proc_dims: None,
            sync_tag_base: 0x4200,
        }
    }
}

impl MeshConfig {
    pub fn new(elements_per_dimension: &[u64]) -> Self {
        Self {
            elements_per_dimension: elements_per_dimension.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_padding(mut self, layers: u64) -> Self {
        self.padding_size = layers;
        self
    }

    pub fn with_refinement_buffer(mut self, order: usize) -> Self {
        self.refinement_buffer = order;
        self
    }

    pub fn with_max_refinement_level(mut self, level: u8) -> Self {
        self.max_refinement_level = level;
        self
    }

    pub fn with_activation_patterns(mut self, patterns: usize) -> Self {
        self.activation_patterns = patterns;
        self
    }

    pub fn with_proc_dims(mut self, dims: &[usize]) -> Self {
        self.proc_dims = Some(dims.to_vec());
        self
    }

    pub fn with_sync_tag_base(mut self, tag: u16) -> Self {
        self.sync_tag_base = tag;
        self
    }

    pub fn dimension(&self) -> Result<Dimension, MeshError> {
        Dimension::new(self.elements_per_dimension.len())
    }

    pub fn sync_tag(&self) -> CommTag {
        CommTag::new(self.sync_tag_base)
    }

    /// Checks internal consistency. Whether `proc_dims` matches the rank count is checked
    /// when the mesh is built.
    pub fn validate(&self) -> Result<(), MeshError> {
        let dim = self.dimension()?;
        if self.elements_per_dimension.iter().any(|&n| n == 0) {
            return Err(MeshError::InvalidConfig(format!(
                "elements_per_dimension {:?} has an empty axis",
                self.elements_per_dimension
            )));
        }
        if self.refinement_buffer > MAX_STENCIL_ORDER {
            return Err(MeshError::InvalidConfig(format!(
                "refinement_buffer {} exceeds {MAX_STENCIL_ORDER}",
                self.refinement_buffer
            )));
        }
        if self.max_refinement_level > MAX_LEVEL {
            return Err(MeshError::InvalidConfig(format!(
                "max_refinement_level {} exceeds {MAX_LEVEL}",
                self.max_refinement_level
            )));
        }
        if self.activation_patterns == 0 {
            return Err(MeshError::InvalidConfig(
                "activation_patterns must be at least 1".into(),
            ));
        }
        if let Some(p) = &self.proc_dims {
            if p.len() != dim.get() || p.iter().any(|&d| d == 0) {
                return Err(MeshError::InvalidConfig(format!(
                    "proc_dims {p:?} does not fit a {}D mesh",
                    dim.get()
                )));
            }
            for (a, (&procs, &cells)) in p.iter().zip(&self.elements_per_dimension).enumerate() {
                if procs as u64 > cells {
                    return Err(MeshError::InvalidConfig(format!(
                        "{procs} processes along axis {a} but only {cells} cells"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        MeshConfig::default().validate().unwrap();
    }

    #[test]
    fn loads_partial_json() {
        let cfg: MeshConfig = serde_json::from_str(
            r#"{ "elements_per_dimension": [8, 4, 2], "refinement_buffer": 2 }"#,
        )
        .unwrap();
        assert_eq!(cfg.dimension().unwrap(), Dimension::Three);
        assert_eq!(cfg.refinement_buffer, 2);
        assert_eq!(cfg.activation_patterns, 1);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_json::from_str::<MeshConfig>(r#"{ "elements": [2, 2] }"#);
        assert!(err.is_err());
    }

    #[test]
    fn validation_failures() {
        assert!(MeshConfig::new(&[2, 2, 2, 2]).validate().is_err());
        assert!(MeshConfig::new(&[2, 0]).validate().is_err());
        assert!(MeshConfig::new(&[2, 2]).with_refinement_buffer(4).validate().is_err());
        assert!(MeshConfig::new(&[2, 2]).with_proc_dims(&[3, 1]).validate().is_err());
        assert!(MeshConfig::new(&[2, 2]).with_proc_dims(&[2]).validate().is_err());
        assert!(MeshConfig::new(&[2, 2]).with_activation_patterns(0).validate().is_err());
    }
}
