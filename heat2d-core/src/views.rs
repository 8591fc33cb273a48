//! Terminal viewers.
//!
//! Fields and order maps are rasterised onto a character grid and drawn
//! with 24-bit ANSI background colours. Each character cell is sampled at
//! its centre; cells outside the mesh stay blank.

use crate::element::RefMap;
use crate::error::{Error, Result};
use crate::solution::Solution;
use crate::space::Space;
use crate::types::{Point2, MAX_ORDER};
use std::fmt::Write as _;
use std::io::{BufRead, Write};

const RESET: &str = "\x1b[0m";

/// Title and raster size of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewWindow {
    pub title: String,
    /// Raster width in characters.
    pub columns: usize,
    /// Upper bound on raster height in characters.
    pub max_rows: usize,
}

impl ViewWindow {
    pub fn new(title: impl Into<String>, columns: usize, max_rows: usize) -> Self {
        Self {
            title: title.into(),
            columns,
            max_rows,
        }
    }
}

/// Sample grid covering a bounding box; terminal cells are about twice as tall as wide.
struct Raster {
    min: Point2,
    dx: f64,
    dy: f64,
    columns: usize,
    rows: usize,
}

impl Raster {
    fn new(window: &ViewWindow, bounds: (Point2, Point2)) -> Result<Self> {
        if window.columns == 0 || window.max_rows == 0 {
            return Err(Error::View(format!(
                "window '{}' has an empty raster",
                window.title
            )));
        }
        let (min, max) = bounds;
        let (w, h) = (max.x - min.x, max.y - min.y);
        if !(w > 0.0 && h > 0.0) {
            return Err(Error::View("nothing to draw, the domain is degenerate".into()));
        }
        let columns = window.columns;
        let rows = ((columns as f64 * h / w / 2.0).round() as usize).clamp(1, window.max_rows);
        Ok(Self {
            min,
            dx: w / columns as f64,
            dy: h / rows as f64,
            columns,
            rows,
        })
    }

    /// Cell centres, top row first.
    fn sample(&self, row: usize, col: usize) -> Point2 {
        Point2::new(
            self.min.x + (col as f64 + 0.5) * self.dx,
            self.min.y + (self.rows - row) as f64 * self.dy - 0.5 * self.dy,
        )
    }
}

fn bounds_of<'a>(maps: impl Iterator<Item = &'a RefMap>) -> Option<(Point2, Point2)> {
    let mut vertices = maps.flat_map(|m| m.vertices().iter());
    let first = *vertices.next()?;
    Some(vertices.fold((first, first), |(lo, hi), v| {
        (
            Point2::new(lo.x.min(v.x), lo.y.min(v.y)),
            Point2::new(hi.x.max(v.x), hi.y.max(v.y)),
        )
    }))
}

/// Blue to red through cyan, green and yellow for `t` in [0, 1].
fn heat_colour(t: f64) -> (u8, u8, u8) {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let channel = |x: f64| (255.0 * x.clamp(0.0, 1.0)).round() as u8;
    (
        channel(1.5 - (4.0 * t - 3.0).abs()),
        channel(1.5 - (4.0 * t - 2.0).abs()),
        channel(1.5 - (4.0 * t - 1.0).abs()),
    )
}

fn paint(out: &mut String, colour: (u8, u8, u8), glyph: char) {
    let (r, g, b) = colour;
    let _ = write!(out, "\x1b[48;2;{r};{g};{b}m\x1b[30m{glyph}{RESET}");
}

fn present<W: Write>(mut out: W, text: &str) -> Result<()> {
    out.write_all(text.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| Error::View(format!("cannot draw view: {e}")))
}

/// Colour map of a scalar field.
#[derive(Debug, Clone)]
pub struct ScalarView {
    window: ViewWindow,
}

impl ScalarView {
    pub fn new(window: ViewWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &ViewWindow {
        &self.window
    }

    /// Rasterise `sln` with a legend line giving its range.
    pub fn render(&self, sln: &Solution) -> Result<String> {
        let bounds = bounds_of(sln.elements().iter().map(|f| &f.map))
            .ok_or_else(|| Error::View("solution has no elements".into()))?;
        let raster = Raster::new(&self.window, bounds)?;
        let (min, max) = sln.min_max();
        let span = if max > min { max - min } else { 1.0 };

        let mut out = String::new();
        let _ = writeln!(out, "{}", self.window.title);
        for row in 0..raster.rows {
            for col in 0..raster.columns {
                let p = raster.sample(row, col);
                match sln.value(p.x, p.y) {
                    Some(v) => paint(&mut out, heat_colour((v - min) / span), ' '),
                    None => out.push(' '),
                }
            }
            out.push('\n');
        }
        let _ = writeln!(out, "min {min:.6e}  max {max:.6e}");
        Ok(out)
    }

    pub fn show<W: Write>(&self, sln: &Solution, out: W) -> Result<()> {
        let text = self.render(sln)?;
        present(out, &text)
    }
}

/// Map of element polynomial orders, one hexadecimal digit per cell.
#[derive(Debug, Clone)]
pub struct OrderView {
    window: ViewWindow,
}

impl OrderView {
    pub fn new(window: ViewWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &ViewWindow {
        &self.window
    }

    pub fn render(&self, space: &Space) -> Result<String> {
        let lists = space.asm_lists();
        let bounds = bounds_of(lists.iter().map(|l| &l.map))
            .ok_or_else(|| Error::View("space has no active elements".into()))?;
        let raster = Raster::new(&self.window, bounds)?;

        let mut out = String::new();
        let _ = writeln!(out, "{}", self.window.title);
        for row in 0..raster.rows {
            for col in 0..raster.columns {
                let p = raster.sample(row, col);
                let order = lists
                    .iter()
                    .find(|l| l.map.inverse(&p).is_some())
                    .map(|l| l.order);
                match order {
                    Some(o) => {
                        let t = (o as f64 - 1.0) / (MAX_ORDER as f64 - 1.0);
                        let glyph = char::from_digit(o as u32, 16).unwrap_or('?');
                        paint(&mut out, heat_colour(t), glyph);
                    }
                    None => out.push(' '),
                }
            }
            out.push('\n');
        }
        Ok(out)
    }

    pub fn show<W: Write>(&self, space: &Space, out: W) -> Result<()> {
        let text = self.render(space)?;
        present(out, &text)
    }
}

/// Block until a line (Enter) or end of input is read from `input`.
pub fn wait_for_close<R: BufRead, W: Write>(mut input: R, mut prompt: W) -> Result<()> {
    write!(prompt, "Press Enter to close the views...")
        .and_then(|_| prompt.flush())
        .map_err(|e| Error::View(format!("cannot prompt: {e}")))?;
    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| Error::View(format!("cannot read from terminal: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bc::EssentialBcs;
    use crate::mesh::tests::two_quads;
    use std::io::Cursor;

    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for d in chars.by_ref() {
                    if d == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_scalar_view_raster_size() {
        let space = Space::new(two_quads(), EssentialBcs::new(), 1).unwrap();
        let coeffs: Vec<f64> = (0..space.num_dofs()).map(|i| i as f64).collect();
        let sln = Solution::vector_to_solution(&coeffs, &space).unwrap();

        let view = ScalarView::new(ViewWindow::new("Solution", 40, 100));
        let text = view.render(&sln).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // Title, 10 raster rows for a 2x1 domain, legend
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], "Solution");
        assert_eq!(strip_ansi(lines[1]).chars().count(), 40);
        assert!(lines[11].starts_with("min"));
    }

    #[test]
    fn test_order_view_digits() {
        let mut space = Space::new(two_quads(), EssentialBcs::new(), 2).unwrap();
        space.set_element_order(1, 10).unwrap();
        let view = OrderView::new(ViewWindow::new("Orders", 20, 5));
        let text = strip_ansi(&view.render(&space).unwrap());
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row, format!("{}{}", "2".repeat(10), "a".repeat(10)));
    }

    #[test]
    fn test_empty_window() {
        let space = Space::new(two_quads(), EssentialBcs::new(), 1).unwrap();
        let view = OrderView::new(ViewWindow::new("Orders", 0, 5));
        assert!(matches!(view.render(&space), Err(Error::View(_))));
    }

    #[test]
    fn test_wait_for_close_reads_a_line() {
        let mut input = Cursor::new(b"\nleftover".to_vec());
        let mut prompt = Vec::new();
        wait_for_close(&mut input, &mut prompt).unwrap();
        assert_eq!(input.position(), 1);
        assert!(String::from_utf8(prompt).unwrap().starts_with("Press Enter"));
        // End of input also closes
        wait_for_close(Cursor::new(Vec::new()), Vec::new()).unwrap();
    }
}
