//! XML mesh reader and writer.
//!
//! ```xml
//! <mesh:mesh xmlns:mesh="XMLMesh">
//!   <variables><var name="a" value="1.0"/></variables>
//!   <vertices><v x="0" y="-a" i="0"/></vertices>
//!   <elements>
//!     <mesh:t v1="0" v2="1" v3="2" m="Copper"/>
//!     <mesh:q v1="0" v2="1" v3="2" v4="3" m="Aluminum"/>
//!   </elements>
//!   <edges><ed v1="0" v2="1" m="Bottom"/></edges>
//!   <curves><arc v1="4" v2="7" angle="45"/></curves>
//!   <refinements><ref element_id="0" refinement_type="0"/></refinements>
//! </mesh:mesh>
//! ```
//!
//! Namespaces are ignored. Curved edges are read but treated as straight.

use crate::error::{Error, Result};
use crate::mesh::{edge_key, Mesh};
use crate::types::{ElementKind, Point2};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Reader/writer for the XML mesh format.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshReaderXml;

impl MeshReaderXml {
    pub fn new() -> Self {
        Self
    }

    /// Load a mesh from a file.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Mesh> {
        let path = path.as_ref();
        let input = fs::read_to_string(path)?;
        let mesh = self.parse(&input)?;
        log::info!(
            "loaded mesh {}: {} vertices, {} active elements",
            path.display(),
            mesh.n_vertices(),
            mesh.n_active_elements()
        );
        Ok(mesh)
    }

    /// Parse a mesh from an XML string.
    pub fn parse(&self, input: &str) -> Result<Mesh> {
        let doc = Document::parse(input)
            .map_err(|err| Error::FileFormat(format!("XML parse error: {err}")))?;
        let root = doc.root_element();
        if root.tag_name().name() != "mesh" {
            return Err(Error::FileFormat(format!(
                "expected root element 'mesh', found '{}'",
                root.tag_name().name()
            )));
        }

        let variables = parse_variables(root)?;
        let mut mesh = Mesh::new();

        // Vertices
        let vertex_nodes: Vec<Node> = section(root, "vertices")
            .into_iter()
            .flat_map(|s| children(s, "v"))
            .collect();
        let mut points: Vec<Option<Point2>> = vec![None; vertex_nodes.len()];
        for v in vertex_nodes {
            let x = coordinate(v, "x", &variables)?;
            let y = coordinate(v, "y", &variables)?;
            let i: usize = parse_attr(v, "i")?;
            if i >= points.len() {
                return Err(Error::FileFormat(format!(
                    "vertex index {i} out of range for {} vertices",
                    points.len()
                )));
            }
            if points[i].is_some() {
                return Err(Error::FileFormat(format!("duplicate vertex index {i}")));
            }
            points[i] = Some(Point2::new(x, y));
        }
        for (i, p) in points.into_iter().enumerate() {
            let p = p.ok_or_else(|| Error::FileFormat(format!("vertex {i} is missing")))?;
            mesh.add_vertex(p);
        }

        // Elements
        let elements = section(root, "elements")
            .ok_or_else(|| Error::FileFormat("missing 'elements' section".into()))?;
        for el in elements.children().filter(Node::is_element) {
            let kind = match el.tag_name().name() {
                "t" | "triangle" => ElementKind::Triangle,
                "q" | "quad" => ElementKind::Quad,
                other => {
                    return Err(Error::FileFormat(format!("unknown element type '{other}'")))
                }
            };
            let mut vertices = Vec::with_capacity(kind.n_vertices());
            for k in 1..=kind.n_vertices() {
                vertices.push(parse_attr::<usize>(el, &format!("v{k}"))?);
            }
            if el.attribute(format!("v{}", kind.n_vertices() + 1).as_str()).is_some() {
                return Err(Error::FileFormat(format!(
                    "element '{}' has too many vertices",
                    el.tag_name().name()
                )));
            }
            let marker = required_attr(el, "m")?;
            mesh.add_element(kind, vertices, marker).map_err(to_format_error)?;
        }
        if mesh.n_elements() == 0 {
            return Err(Error::FileFormat("mesh has no elements".into()));
        }

        // Boundary edges
        for ed in section(root, "edges").into_iter().flat_map(|s| children(s, "ed")) {
            let v1: usize = parse_attr(ed, "v1")?;
            let v2: usize = parse_attr(ed, "v2")?;
            let marker = required_attr(ed, "m")?;
            mesh.add_boundary_edge(v1, v2, marker).map_err(to_format_error)?;
        }

        // Curves
        if let Some(curves) = section(root, "curves") {
            for curve in curves.children().filter(Node::is_element) {
                let v1: usize = parse_attr(curve, "v1")?;
                let v2: usize = parse_attr(curve, "v2")?;
                if mesh.edge_elements(edge_key(v1, v2)).is_empty() {
                    return Err(Error::FileFormat(format!(
                        "curved edge ({v1}, {v2}) is not an element edge"
                    )));
                }
                log::warn!(
                    "curved edge ({}, {}) of type '{}' is treated as straight",
                    v1,
                    v2,
                    curve.tag_name().name()
                );
            }
        }

        // Refinement history
        for r in section(root, "refinements").into_iter().flat_map(|s| children(s, "ref")) {
            let id: usize = parse_attr(r, "element_id")?;
            let ref_type: usize = match r.attribute("refinement_type") {
                Some(_) => parse_attr(r, "refinement_type")?,
                None => 0,
            };
            if ref_type != 0 {
                return Err(Error::FileFormat(format!(
                    "unsupported refinement type {ref_type} for element {id}"
                )));
            }
            match mesh.element(id) {
                Some(e) if e.active => mesh.refine_element(id).map_err(to_format_error)?,
                _ => {
                    return Err(Error::FileFormat(format!(
                        "refinement of element {id} which is not active"
                    )))
                }
            }
        }

        Ok(mesh)
    }

    /// Save a mesh as its base mesh plus refinement history.
    pub fn save<P: AsRef<Path>>(&self, path: P, mesh: &Mesh) -> Result<()> {
        fs::write(path.as_ref(), self.to_xml(mesh))?;
        log::info!("saved mesh to {}", path.as_ref().display());
        Ok(())
    }

    /// Serialise a mesh to the XML format.
    pub fn to_xml(&self, mesh: &Mesh) -> String {
        let (n_vertices, n_elements) = mesh.base_counts();
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        let _ = writeln!(out, "<mesh:mesh xmlns:mesh=\"XMLMesh\">");

        let _ = writeln!(out, "  <vertices>");
        for (i, v) in mesh.vertices()[..n_vertices].iter().enumerate() {
            let _ = writeln!(out, "    <v x=\"{}\" y=\"{}\" i=\"{}\"/>", v[0], v[1], i);
        }
        let _ = writeln!(out, "  </vertices>");

        let _ = writeln!(out, "  <elements>");
        for e in &mesh.elements()[..n_elements] {
            let tag = match e.kind {
                ElementKind::Triangle => "t",
                ElementKind::Quad => "q",
            };
            let _ = write!(out, "    <mesh:{tag}");
            for (k, v) in e.vertices.iter().enumerate() {
                let _ = write!(out, " v{}=\"{}\"", k + 1, v);
            }
            let _ = writeln!(out, " m=\"{}\"/>", escape(mesh.region_of(e)));
        }
        let _ = writeln!(out, "  </elements>");

        let mut edges: Vec<_> = mesh
            .boundary_edges()
            .filter(|&((a, b), _)| a < n_vertices && b < n_vertices)
            .collect();
        edges.sort_unstable();
        let _ = writeln!(out, "  <edges>");
        for ((a, b), marker) in edges {
            let name = mesh.boundary_markers().name(marker).unwrap_or("");
            let _ = writeln!(out, "    <ed v1=\"{}\" v2=\"{}\" m=\"{}\"/>", a, b, escape(name));
        }
        let _ = writeln!(out, "  </edges>");

        if !mesh.refinements().is_empty() {
            let _ = writeln!(out, "  <refinements>");
            for id in mesh.refinements() {
                let _ = writeln!(out, "    <ref element_id=\"{id}\" refinement_type=\"0\"/>");
            }
            let _ = writeln!(out, "  </refinements>");
        }

        let _ = writeln!(out, "</mesh:mesh>");
        out
    }
}

fn to_format_error(err: Error) -> Error {
    match err {
        Error::Mesh(msg) => Error::FileFormat(msg),
        other => other,
    }
}

fn section<'a, 'input>(root: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    root.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        Error::FileFormat(format!(
            "element '{}' is missing attribute '{}'",
            node.tag_name().name(),
            name
        ))
    })
}

fn parse_attr<T: std::str::FromStr>(node: Node, name: &str) -> Result<T> {
    let raw = required_attr(node, name)?;
    raw.trim().parse().map_err(|_| {
        Error::FileFormat(format!(
            "invalid value '{}' for attribute '{}' of '{}'",
            raw,
            name,
            node.tag_name().name()
        ))
    })
}

fn parse_variables(root: Node) -> Result<HashMap<String, f64>> {
    let mut vars = HashMap::new();
    for var in section(root, "variables").into_iter().flat_map(|s| children(s, "var")) {
        let name = required_attr(var, "name")?;
        let raw = required_attr(var, "value")?;
        let value = resolve(raw, &vars).ok_or_else(|| {
            Error::FileFormat(format!("invalid value '{raw}' for variable '{name}'"))
        })?;
        vars.insert(name.to_string(), value);
    }
    Ok(vars)
}

fn coordinate(node: Node, name: &str, vars: &HashMap<String, f64>) -> Result<f64> {
    let raw = required_attr(node, name)?;
    resolve(raw, vars).ok_or_else(|| {
        Error::FileFormat(format!("invalid coordinate '{raw}' (attribute '{name}')"))
    })
}

/// A number, a variable name or a negated variable name.
fn resolve(raw: &str, vars: &HashMap<String, f64>) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<f64>() {
        return v.is_finite().then_some(v);
    }
    match raw.strip_prefix('-') {
        Some(name) => vars.get(name.trim()).map(|v| -v),
        None => vars.get(raw).copied(),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r#"<?xml version="1.0"?>
<mesh:mesh xmlns:mesh="XMLMesh">
  <variables>
    <var name="a" value="1.0"/>
  </variables>
  <vertices>
    <v x="0" y="0" i="0"/>
    <v x="a" y="0" i="1"/>
    <v x="a" y="a" i="2"/>
    <v x="0" y="a" i="3"/>
    <v x="-a" y="0" i="4"/>
  </vertices>
  <elements>
    <mesh:q v1="0" v2="1" v3="2" v4="3" m="Copper"/>
    <mesh:t v1="4" v2="0" v3="3" m="Aluminum"/>
  </elements>
  <edges>
    <ed v1="0" v2="1" m="Bottom"/>
    <ed v1="3" v2="4" m="Left"/>
  </edges>
</mesh:mesh>"#;

    #[test]
    fn test_parse() {
        let mesh = MeshReaderXml::new().parse(SQUARE).unwrap();
        assert_eq!(mesh.n_vertices(), 5);
        assert_eq!(mesh.n_elements(), 2);
        assert_eq!(mesh.vertex(4).unwrap()[0], -1.0);
        assert_eq!(mesh.element(1).unwrap().kind, ElementKind::Triangle);
        assert_eq!(mesh.n_active_elements_in("Aluminum"), 1);
        assert!(mesh.boundary_markers().find("Left").is_some());
    }

    #[test]
    fn test_malformed_xml() {
        let result = MeshReaderXml::new().parse("<mesh><vertices></mesh>");
        assert!(matches!(result, Err(Error::FileFormat(_))));
    }

    #[test]
    fn test_unknown_vertex() {
        let bad = SQUARE.replace("v4=\"3\"", "v4=\"9\"");
        assert!(matches!(MeshReaderXml::new().parse(&bad), Err(Error::FileFormat(_))));
    }

    #[test]
    fn test_unknown_variable() {
        let bad = SQUARE.replace("x=\"a\" y=\"a\"", "x=\"b\" y=\"a\"");
        assert!(matches!(MeshReaderXml::new().parse(&bad), Err(Error::FileFormat(_))));
    }

    #[test]
    fn test_edge_must_be_element_edge() {
        let bad = SQUARE.replace("<ed v1=\"0\" v2=\"1\"", "<ed v1=\"0\" v2=\"2\"");
        assert!(matches!(MeshReaderXml::new().parse(&bad), Err(Error::FileFormat(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = MeshReaderXml::new().load("/nonexistent/domain.xml");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_xml_roundtrip_with_refinements() {
        let reader = MeshReaderXml::new();
        let mut mesh = reader.parse(SQUARE).unwrap();
        mesh.refine_in_area("Copper").unwrap();
        mesh.refine_element(2).unwrap();

        let reloaded = reader.parse(&reader.to_xml(&mesh)).unwrap();
        assert_eq!(reloaded.n_elements(), mesh.n_elements());
        assert_eq!(reloaded.n_vertices(), mesh.n_vertices());
        assert_eq!(reloaded.refinements(), mesh.refinements());
        for (a, b) in reloaded.elements().iter().zip(mesh.elements()) {
            assert_eq!(a, b);
        }
    }
}
