//! Cell type metadata for background cells.

use crate::topology::dimension::Dimension;

/// Geometry of a background cell. Background cells are always tensor-product cells.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CellType {
    /// 1D segment.
    Line,
    /// 2D tensor-product cell.
    Quadrilateral,
    /// 3D tensor-product cell.
    Hexahedron,
}

impl CellType {
    /// Cell type of a forest of the given dimensionality.
    pub const fn for_dimension(dim: Dimension) -> Self {
        match dim {
            Dimension::One => CellType::Line,
            Dimension::Two => CellType::Quadrilateral,
            Dimension::Three => CellType::Hexahedron,
        }
    }

    /// Topological dimension.
    pub const fn dimension(self) -> u8 {
        match self {
            CellType::Line => 1,
            CellType::Quadrilateral => 2,
            CellType::Hexahedron => 3,
        }
    }

    /// Number of corner vertices.
    pub const fn corners(self) -> usize {
        1 << self.dimension()
    }

    /// Geometric interpolation order. Background cells are multilinear.
    pub const fn interpolation_order(self) -> u8 {
        1
    }

    /// VTK legacy cell type code (`VTK_LINE`, `VTK_QUAD`, `VTK_HEXAHEDRON`).
    pub const fn vtk_code(self) -> u8 {
        match self {
            CellType::Line => 3,
            CellType::Quadrilateral => 9,
            CellType::Hexahedron => 12,
        }
    }

    /// GMSH element type code for first-order elements.
    pub const fn gmsh_code(self) -> u8 {
        match self {
            CellType::Line => 1,
            CellType::Quadrilateral => 3,
            CellType::Hexahedron => 5,
        }
    }

    /// Local corner indices (bit `axis` = high side) in VTK's counter-clockwise order.
    pub const fn vtk_corner_order(self) -> &'static [usize] {
        match self {
            CellType::Line => &[0, 1],
            CellType::Quadrilateral => &[0, 1, 3, 2],
            CellType::Hexahedron => &[0, 1, 3, 2, 4, 5, 7, 6],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tables::child_bits;

    #[test]
    fn codes() {
        assert_eq!(CellType::for_dimension(Dimension::Two).vtk_code(), 9);
        assert_eq!(CellType::Hexahedron.gmsh_code(), 5);
        assert_eq!(CellType::Line.corners(), 2);
    }

    #[test]
    fn vtk_quad_order_walks_the_boundary() {
        // consecutive corners differ in exactly one axis
        let order = CellType::Quadrilateral.vtk_corner_order();
        for w in 0..order.len() {
            let a = child_bits(order[w]);
            let b = child_bits(order[(w + 1) % order.len()]);
            let diff = a.iter().zip(&b).filter(|(x, y)| x != y).count();
            assert_eq!(diff, 1);
        }
    }
}
