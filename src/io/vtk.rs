//! Legacy ASCII VTK (`.vtk`) output of a decomposition.
//!
//! One `UNSTRUCTURED_GRID` per rank with one cell per sub-domain: lines in
//! 1-D, quads in 2-D, hexahedra in 3-D. `CELL_DATA` carries the sub-domain
//! id, the owning rank and the computation cost so a viewer can color by
//! owner.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::SubDomainRecord;
use crate::decomp_error::DecompError;

const FIELD_ID: &str = "id";
const FIELD_OWNER: &str = "owner";
const FIELD_COMPUTATION: &str = "computation";

#[derive(Debug, Default, Clone)]
pub struct VtkWriter;

#[derive(Debug, Default, Clone)]
pub struct VtkReader;

/// VTK cell type and corner offsets (0 = lo, 1 = hi per axis) in VTK order.
fn cell_layout(dim: usize) -> Option<(u8, &'static [[usize; 3]])> {
    match dim {
        1 => Some((3, &[[0, 0, 0], [1, 0, 0]])),
        2 => Some((9, &[[0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0]])),
        3 => Some((
            12,
            &[
                [0, 0, 0],
                [1, 0, 0],
                [1, 1, 0],
                [0, 1, 0],
                [0, 0, 1],
                [1, 0, 1],
                [1, 1, 1],
                [0, 1, 1],
            ],
        )),
        _ => None,
    }
}

impl VtkWriter {
    /// Write `records` as one legacy VTK dataset.
    pub fn write<const D: usize, W: Write>(
        writer: &mut W,
        title: &str,
        records: &[SubDomainRecord<D>],
    ) -> Result<(), DecompError> {
        let (cell_type, corners) = cell_layout(D).ok_or_else(|| {
            DecompError::InvalidConfig(format!("VTK output supports 1 to 3 dimensions, not {D}"))
        })?;
        let per_cell = corners.len();
        let n = records.len();

        writeln!(writer, "# vtk DataFile Version 3.0")?;
        writeln!(writer, "{}", title.lines().next().unwrap_or_default())?;
        writeln!(writer, "ASCII")?;
        writeln!(writer, "DATASET UNSTRUCTURED_GRID")?;

        writeln!(writer, "POINTS {} double", n * per_cell)?;
        for r in records {
            for corner in corners {
                let mut xyz = [0.0f64; 3];
                for (k, x) in xyz.iter_mut().enumerate().take(D) {
                    *x = if corner[k] == 0 { r.bounds.lo[k] } else { r.bounds.hi[k] };
                }
                writeln!(writer, "{} {} {}", xyz[0], xyz[1], xyz[2])?;
            }
        }

        writeln!(writer, "CELLS {} {}", n, n * (per_cell + 1))?;
        for i in 0..n {
            write!(writer, "{per_cell}")?;
            for c in 0..per_cell {
                write!(writer, " {}", i * per_cell + c)?;
            }
            writeln!(writer)?;
        }
        writeln!(writer, "CELL_TYPES {n}")?;
        for _ in 0..n {
            writeln!(writer, "{cell_type}")?;
        }

        writeln!(writer, "CELL_DATA {n}")?;
        Self::write_scalars(writer, FIELD_ID, "long", records.iter().map(|r| r.id.to_string()))?;
        Self::write_scalars(
            writer,
            FIELD_OWNER,
            "int",
            records.iter().map(|r| r.owner.to_string()),
        )?;
        Self::write_scalars(
            writer,
            FIELD_COMPUTATION,
            "double",
            records.iter().map(|r| r.computation.to_string()),
        )?;
        Ok(())
    }

    fn write_scalars<W: Write>(
        writer: &mut W,
        name: &str,
        data_type: &str,
        values: impl Iterator<Item = String>,
    ) -> Result<(), DecompError> {
        writeln!(writer, "SCALARS {name} {data_type} 1")?;
        writeln!(writer, "LOOKUP_TABLE default")?;
        for v in values {
            writeln!(writer, "{v}")?;
        }
        Ok(())
    }

    /// Write `dir/{stem}_{rank}.vtk` and return its path.
    pub fn write_rank_file<const D: usize>(
        dir: &Path,
        stem: &str,
        rank: usize,
        records: &[SubDomainRecord<D>],
    ) -> Result<PathBuf, DecompError> {
        let path = dir.join(format!("{stem}_{rank}.vtk"));
        let mut out = BufWriter::new(File::create(&path)?);
        Self::write(&mut out, &format!("{stem} rank {rank}"), records)?;
        out.flush()?;
        Ok(path)
    }
}

impl VtkReader {
    /// Read back the `CELL_DATA` scalar arrays of a file written by
    /// [`VtkWriter`], keyed by array name.
    pub fn read_cell_data<R: Read>(reader: R) -> Result<BTreeMap<String, Vec<f64>>, DecompError> {
        let mut lines = BufReader::new(reader).lines();
        let bad = |msg: String| DecompError::Io(format!("malformed VTK: {msg}"));

        let mut n_cells = None;
        for line in lines.by_ref() {
            let line = line?;
            if let Some(rest) = line.strip_prefix("CELL_DATA ") {
                n_cells = Some(
                    rest.trim()
                        .parse::<usize>()
                        .map_err(|e| bad(format!("CELL_DATA count: {e}")))?,
                );
                break;
            }
        }
        let n = n_cells.ok_or_else(|| bad("no CELL_DATA section".into()))?;

        let mut arrays = BTreeMap::new();
        while let Some(line) = lines.next() {
            let line = line?;
            let mut head = line.split_whitespace();
            match head.next() {
                Some("SCALARS") => {}
                None => continue,
                Some(other) => return Err(bad(format!("unexpected `{other}`"))),
            }
            let name = head
                .next()
                .ok_or_else(|| bad("SCALARS without a name".into()))?
                .to_string();
            match lines.next() {
                Some(Ok(l)) if l.starts_with("LOOKUP_TABLE") => {}
                _ => return Err(bad(format!("{name}: missing LOOKUP_TABLE"))),
            }
            let mut values = Vec::with_capacity(n);
            while values.len() < n {
                let l = lines
                    .next()
                    .ok_or_else(|| bad(format!("{name}: expected {n} values")))??;
                for tok in l.split_whitespace() {
                    values.push(
                        tok.parse::<f64>()
                            .map_err(|e| bad(format!("{name}: {e}")))?,
                    );
                }
            }
            arrays.insert(name, values);
        }
        Ok(arrays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Aabb;

    fn records() -> Vec<SubDomainRecord<2>> {
        vec![
            SubDomainRecord {
                id: 0,
                owner: 0,
                computation: 1.0,
                bounds: Aabb::new([0.0, 0.0], [0.5, 1.0]),
            },
            SubDomainRecord {
                id: 1,
                owner: 1,
                computation: 2.5,
                bounds: Aabb::new([0.5, 0.0], [1.0, 1.0]),
            },
        ]
    }

    #[test]
    fn quads_and_cell_data() {
        let mut buf = Vec::new();
        VtkWriter::write(&mut buf, "test", &records()).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("POINTS 8 double"));
        assert!(text.contains("CELLS 2 10"));
        assert!(text.contains("4 4 5 6 7"));
        assert!(text.contains("0.5 1 0"));

        let data = VtkReader::read_cell_data(buf.as_slice()).unwrap();
        assert_eq!(data["id"], vec![0.0, 1.0]);
        assert_eq!(data["owner"], vec![0.0, 1.0]);
        assert_eq!(data["computation"], vec![1.0, 2.5]);
    }

    #[test]
    fn four_dimensions_are_rejected() {
        let r = SubDomainRecord {
            id: 0,
            owner: 0,
            computation: 1.0,
            bounds: Aabb::new([0.0; 4], [1.0; 4]),
        };
        let mut buf = Vec::new();
        assert!(matches!(
            VtkWriter::write(&mut buf, "x", &[r]),
            Err(DecompError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_cell_data_is_an_error() {
        let text = "# vtk DataFile Version 3.0\nx\nASCII\n";
        assert!(VtkReader::read_cell_data(text.as_bytes()).is_err());
    }
}
