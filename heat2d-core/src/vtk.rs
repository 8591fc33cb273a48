//! Legacy VTK (`.vtk`) export of solutions, meshes and order maps.
//!
//! All files are ASCII `UNSTRUCTURED_GRID` datasets.
//!
//! - [`Linearizer`] turns a higher-order [`Solution`] into linear cells by
//!   adaptive subdivision of each element, with the field as point data.
//! - [`Orderizer`] writes the active elements of a [`Space`] with their
//!   polynomial order, region marker or nothing as cell data.

use crate::error::Result;
use crate::solution::{ElementField, Solution};
use crate::space::Space;
use crate::types::ElementKind;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Accuracy of the linearization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Epsilon {
    Low,
    #[default]
    Normal,
    High,
    VeryHigh,
}

impl Epsilon {
    /// Allowed deviation from linear interpolation, relative to the field's range.
    pub fn tolerance(self) -> f64 {
        match self {
            Epsilon::Low => 7e-3,
            Epsilon::Normal => 7e-4,
            Epsilon::High => 1e-4,
            Epsilon::VeryHigh => 1e-6,
        }
    }

    /// Maximum subdivision depth per element.
    pub fn max_level(self) -> usize {
        match self {
            Epsilon::Low => 2,
            Epsilon::Normal => 3,
            Epsilon::High => 4,
            Epsilon::VeryHigh => 5,
        }
    }
}

/// Linear cells with point values.
#[derive(Debug, Clone, Default)]
pub struct LinearizedField {
    pub points: Vec<[f64; 3]>,
    pub values: Vec<f64>,
    pub cells: Vec<(ElementKind, Vec<usize>)>,
}

impl LinearizedField {
    fn push_cell(&mut self, kind: ElementKind, points: &[[f64; 3]], values: &[f64]) {
        let start = self.points.len();
        self.points.extend_from_slice(points);
        self.values.extend_from_slice(values);
        self.cells.push((kind, (start..start + points.len()).collect()));
    }
}

/// In-memory unstructured grid, written as legacy VTK.
struct VtkGrid<'a> {
    points: &'a [[f64; 3]],
    cells: &'a [(ElementKind, Vec<usize>)],
    point_data: Option<(&'a str, &'a [f64])>,
    cell_data: Option<(&'a str, Vec<f64>)>,
}

impl VtkGrid<'_> {
    fn write<W: Write>(&self, mut writer: W, title: &str) -> Result<()> {
        writeln!(writer, "# vtk DataFile Version 3.0")?;
        writeln!(writer, "{title}")?;
        writeln!(writer, "ASCII")?;
        writeln!(writer, "DATASET UNSTRUCTURED_GRID")?;

        writeln!(writer, "POINTS {} double", self.points.len())?;
        for p in self.points {
            writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
        }

        let size: usize = self.cells.iter().map(|(_, c)| c.len() + 1).sum();
        writeln!(writer, "CELLS {} {}", self.cells.len(), size)?;
        for (_, conn) in self.cells {
            write!(writer, "{}", conn.len())?;
            for idx in conn {
                write!(writer, " {idx}")?;
            }
            writeln!(writer)?;
        }

        writeln!(writer, "CELL_TYPES {}", self.cells.len())?;
        for (kind, _) in self.cells {
            writeln!(writer, "{}", kind.vtk_cell_type())?;
        }

        if let Some((name, values)) = self.point_data {
            writeln!(writer, "POINT_DATA {}", values.len())?;
            writeln!(writer, "SCALARS {} double 1", name)?;
            writeln!(writer, "LOOKUP_TABLE default")?;
            for v in values {
                writeln!(writer, "{v}")?;
            }
        }

        if let Some((name, values)) = &self.cell_data {
            writeln!(writer, "CELL_DATA {}", values.len())?;
            writeln!(writer, "SCALARS {} double 1", name)?;
            writeln!(writer, "LOOKUP_TABLE default")?;
            for v in values {
                writeln!(writer, "{v}")?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn save(&self, path: &Path, title: &str) -> Result<()> {
        let file = File::create(path)?;
        self.write(BufWriter::new(file), title)?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}

/// Adaptive linearization of solutions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linearizer;

struct Refiner<'a> {
    field: &'a ElementField,
    tolerance: f64,
    min_level: usize,
    max_level: usize,
    mode_3d: bool,
}

impl Refiner<'_> {
    fn physical(&self, r: [f64; 2], value: f64) -> [f64; 3] {
        let p = self.field.map.forward(r[0], r[1]);
        [p[0], p[1], if self.mode_3d { value } else { 0.0 }]
    }

    fn emit(&self, kind: ElementKind, verts: &[[f64; 2]], vals: &[f64], out: &mut LinearizedField) {
        let points: Vec<[f64; 3]> = verts
            .iter()
            .zip(vals)
            .map(|(&r, &v)| self.physical(r, v))
            .collect();
        out.push_cell(kind, &points, vals);
    }

    fn triangle(&self, v: [[f64; 2]; 3], vals: [f64; 3], level: usize, out: &mut LinearizedField) {
        if level < self.max_level {
            let m = [mid(v[0], v[1]), mid(v[1], v[2]), mid(v[2], v[0])];
            let mv = m.map(|p| self.field.value(p[0], p[1]));
            let err = (0..3)
                .map(|i| (mv[i] - 0.5 * (vals[i] + vals[(i + 1) % 3])).abs())
                .fold(0.0, f64::max);
            if level < self.min_level || err > self.tolerance {
                self.triangle([v[0], m[0], m[2]], [vals[0], mv[0], mv[2]], level + 1, out);
                self.triangle([m[0], v[1], m[1]], [mv[0], vals[1], mv[1]], level + 1, out);
                self.triangle([m[2], m[1], v[2]], [mv[2], mv[1], vals[2]], level + 1, out);
                self.triangle([m[0], m[1], m[2]], mv, level + 1, out);
                return;
            }
        }
        self.emit(ElementKind::Triangle, &v, &vals, out);
    }

    fn quad(&self, v: [[f64; 2]; 4], vals: [f64; 4], level: usize, out: &mut LinearizedField) {
        if level < self.max_level {
            let m = [mid(v[0], v[1]), mid(v[1], v[2]), mid(v[2], v[3]), mid(v[3], v[0])];
            let c = mid(v[0], v[2]);
            let mv = m.map(|p| self.field.value(p[0], p[1]));
            let cv = self.field.value(c[0], c[1]);
            let edge_err = (0..4)
                .map(|i| (mv[i] - 0.5 * (vals[i] + vals[(i + 1) % 4])).abs())
                .fold(0.0, f64::max);
            let centre_err = (cv - 0.25 * vals.iter().sum::<f64>()).abs();
            if level < self.min_level || edge_err.max(centre_err) > self.tolerance {
                self.quad([v[0], m[0], c, m[3]], [vals[0], mv[0], cv, mv[3]], level + 1, out);
                self.quad([m[0], v[1], m[1], c], [mv[0], vals[1], mv[1], cv], level + 1, out);
                self.quad([c, m[1], v[2], m[2]], [cv, mv[1], vals[2], mv[2]], level + 1, out);
                self.quad([m[3], c, m[2], v[3]], [mv[3], cv, mv[2], vals[3]], level + 1, out);
                return;
            }
        }
        self.emit(ElementKind::Quad, &v, &vals, out);
    }
}

fn mid(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1])]
}

impl Linearizer {
    pub fn new() -> Self {
        Self
    }

    /// Subdivide every element until the field is linear within `eps`.
    pub fn linearize(&self, sln: &Solution, mode_3d: bool, eps: Epsilon) -> LinearizedField {
        let (min, max) = sln.min_max();
        let range = if max > min { max - min } else { 1.0 };
        let mut out = LinearizedField::default();

        for field in sln.elements() {
            let refiner = Refiner {
                field,
                tolerance: eps.tolerance() * range,
                min_level: usize::from(field.order > 1),
                max_level: eps.max_level(),
                mode_3d,
            };
            match field.kind() {
                ElementKind::Triangle => {
                    let v = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0]];
                    let vals = v.map(|p| field.value(p[0], p[1]));
                    refiner.triangle(v, vals, 0, &mut out);
                }
                ElementKind::Quad => {
                    let v = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
                    let vals = v.map(|p| field.value(p[0], p[1]));
                    refiner.quad(v, vals, 0, &mut out);
                }
            }
        }
        out
    }

    /// Write the solution as point data named `quantity`.
    ///
    /// In 3D mode the value is also used as the z coordinate.
    pub fn save_solution_vtk<P: AsRef<Path>>(
        &self,
        sln: &Solution,
        path: P,
        quantity: &str,
        mode_3d: bool,
        eps: Epsilon,
    ) -> Result<()> {
        let lin = self.linearize(sln, mode_3d, eps);
        log::debug!(
            "linearized {} elements into {} cells",
            sln.elements().len(),
            lin.cells.len()
        );
        VtkGrid {
            points: &lin.points,
            cells: &lin.cells,
            point_data: Some((quantity, &lin.values)),
            cell_data: None,
        }
        .save(path.as_ref(), quantity)
    }
}

/// Export of element-wise data of a space.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orderizer;

impl Orderizer {
    pub fn new() -> Self {
        Self
    }

    fn element_cells(space: &Space) -> (Vec<[f64; 3]>, Vec<(ElementKind, Vec<usize>)>) {
        let mesh = space.mesh();
        let mut points = Vec::new();
        let mut cells = Vec::new();
        for list in space.asm_lists() {
            let start = points.len();
            points.extend(list.map.vertices().iter().map(|v| [v[0], v[1], 0.0]));
            cells.push((list.kind, (start..points.len()).collect()));
        }
        debug_assert_eq!(cells.len(), mesh.n_active_elements());
        (points, cells)
    }

    fn save_cell_data(
        space: &Space,
        path: &Path,
        title: &str,
        data: Option<(&str, Vec<f64>)>,
    ) -> Result<()> {
        let (points, cells) = Self::element_cells(space);
        VtkGrid {
            points: &points,
            cells: &cells,
            point_data: None,
            cell_data: data,
        }
        .save(path, title)
    }

    /// Write the active elements without data.
    pub fn save_mesh_vtk<P: AsRef<Path>>(&self, space: &Space, path: P) -> Result<()> {
        Self::save_cell_data(space, path.as_ref(), "mesh", None)
    }

    /// Write the active elements with their polynomial order.
    pub fn save_orders_vtk<P: AsRef<Path>>(&self, space: &Space, path: P) -> Result<()> {
        let orders = space.asm_lists().iter().map(|l| l.order as f64).collect();
        Self::save_cell_data(space, path.as_ref(), "orders", Some(("order", orders)))
    }

    /// Write the active elements with their region marker index.
    pub fn save_markers_vtk<P: AsRef<Path>>(&self, space: &Space, path: P) -> Result<()> {
        let markers = space.asm_lists().iter().map(|l| l.marker as f64).collect();
        Self::save_cell_data(space, path.as_ref(), "markers", Some(("marker", markers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bc::EssentialBcs;
    use crate::mesh::tests::two_quads;
    use std::fs;

    fn linear_solution(order: usize) -> (Space, Solution) {
        let space = Space::new(two_quads(), EssentialBcs::new(), order).unwrap();
        let mut coeffs = vec![0.0; space.num_dofs()];
        for (i, c) in coeffs.iter_mut().take(space.vertex_functions_count()).enumerate() {
            *c = i as f64;
        }
        let sln = Solution::vector_to_solution(&coeffs, &space).unwrap();
        (space, sln)
    }

    #[test]
    fn test_linear_field_is_not_subdivided() {
        let (_, sln) = linear_solution(1);
        let lin = Linearizer::new().linearize(&sln, false, Epsilon::VeryHigh);
        assert_eq!(lin.cells.len(), 2);
        assert_eq!(lin.points.len(), 8);
    }

    #[test]
    fn test_curved_field_is_subdivided() {
        let space = Space::new(two_quads(), EssentialBcs::new(), 4).unwrap();
        let coeffs: Vec<f64> = (0..space.num_dofs()).map(|i| (i as f64).cos()).collect();
        let sln = Solution::vector_to_solution(&coeffs, &space).unwrap();
        let low = Linearizer::new().linearize(&sln, false, Epsilon::Low);
        let high = Linearizer::new().linearize(&sln, false, Epsilon::VeryHigh);
        assert!(low.cells.len() >= 8);
        assert!(high.cells.len() > low.cells.len());
        for (p, v) in high.points.iter().zip(&high.values) {
            assert_eq!(p[2], 0.0);
            assert!(v.is_finite());
        }
    }

    #[test]
    fn test_save_solution_vtk() {
        let (_, sln) = linear_solution(1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sln.vtk");
        Linearizer::new()
            .save_solution_vtk(&sln, &path, "Temperature", true, Epsilon::Normal)
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# vtk DataFile Version 3.0\n"));
        assert!(text.contains("DATASET UNSTRUCTURED_GRID"));
        assert!(text.contains("POINTS 8 double"));
        assert!(text.contains("CELLS 2 10"));
        assert!(text.contains("POINT_DATA 8"));
        assert!(text.contains("SCALARS Temperature double 1"));
    }

    #[test]
    fn test_save_orders_and_markers() {
        let (mut space, _) = linear_solution(2);
        space.set_element_order(1, 3).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let orders = dir.path().join("ord.vtk");
        Orderizer::new().save_orders_vtk(&space, &orders).unwrap();
        let text = fs::read_to_string(&orders).unwrap();
        assert!(text.contains("CELL_DATA 2"));
        assert!(text.contains("SCALARS order double 1\nLOOKUP_TABLE default\n2\n3\n"));

        let markers = dir.path().join("markers.vtk");
        Orderizer::new().save_markers_vtk(&space, &markers).unwrap();
        assert!(fs::read_to_string(&markers).unwrap().contains("SCALARS marker double 1"));

        let mesh = dir.path().join("mesh.vtk");
        Orderizer::new().save_mesh_vtk(&space, &mesh).unwrap();
        let text = fs::read_to_string(&mesh).unwrap();
        assert!(text.contains("CELL_TYPES 2\n9\n9\n"));
        assert!(!text.contains("CELL_DATA"));
    }

    #[test]
    fn test_unwritable_path() {
        let (space, _) = linear_solution(1);
        let result = Orderizer::new().save_mesh_vtk(&space, "/nonexistent/dir/mesh.vtk");
        assert!(matches!(result, Err(crate::error::Error::Io(_))));
    }
}
