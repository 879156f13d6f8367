use crate::core::models::stage::BoxBounds;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmpdatError {
    #[error("Failed to read data file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Read(#[from] io::Error),
    #[error("Invalid header line {line}: '{content}'")]
    InvalidHeader { line: usize, content: String },
    #[error("Data file header does not declare an atom count")]
    MissingAtomCount,
}

/// Counts and box of a LAMMPS data file, read from its header only.
#[derive(Debug, Clone, PartialEq)]
pub struct DataHeader {
    pub atoms: usize,
    pub bounds: Option<BoxBounds>,
}

impl DataHeader {
    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, LmpdatError> {
        let mut atoms = None;
        let mut lo = [None; 3];
        let mut hi = [None; 3];

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let content = line.split('#').next().unwrap_or("").trim();
            // The first line is a free-form title.
            if idx == 0 || content.is_empty() {
                continue;
            }

            let fields: Vec<&str> = content.split_whitespace().collect();
            let invalid = || LmpdatError::InvalidHeader {
                line: idx + 1,
                content: content.to_string(),
            };

            match fields.as_slice() {
                [count, "atoms"] => {
                    atoms = Some(count.parse::<usize>().map_err(|_| invalid())?);
                }
                [a, b, _, label] if label.len() == 3 && label.ends_with("hi") => {
                    let axis = match label.as_bytes()[0] {
                        b'x' => 0,
                        b'y' => 1,
                        b'z' => 2,
                        _ => continue,
                    };
                    lo[axis] = Some(a.parse::<f64>().map_err(|_| invalid())?);
                    hi[axis] = Some(b.parse::<f64>().map_err(|_| invalid())?);
                }
                // Header ends at the first section keyword.
                [section, ..] if section.chars().all(|c| c.is_ascii_alphabetic()) => break,
                _ => {}
            }
        }

        let bounds = match (lo, hi) {
            ([Some(x0), Some(y0), Some(z0)], [Some(x1), Some(y1), Some(z1)]) => Some(BoxBounds {
                lo: [x0, y0, z0],
                hi: [x1, y1, z1],
            }),
            _ => None,
        };

        Ok(Self {
            atoms: atoms.ok_or(LmpdatError::MissingAtomCount)?,
            bounds,
        })
    }

    pub fn read_from_path(path: &Path) -> Result<Self, LmpdatError> {
        let file = File::open(path).map_err(|source| LmpdatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_from(&mut BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_atom_count_and_box() {
        let text = "\
LAMMPS data file via write_data, version 29 Oct 2020, timestep = 0

120 atoms
6 atom types
118 bonds

-12.5 12.5 xlo xhi
-10.0 10.0 ylo yhi
0.0 30.0 zlo zhi

Masses

1 12.011
";
        let header = DataHeader::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(header.atoms, 120);
        let bounds = header.bounds.unwrap();
        assert_eq!(bounds.lo, [-12.5, -10.0, 0.0]);
        assert_eq!(bounds.hi, [12.5, 10.0, 30.0]);
    }

    #[test]
    fn missing_atom_count_is_an_error() {
        let text = "title\n\n-1 1 xlo xhi\n\nAtoms\n";
        assert!(matches!(
            DataHeader::read_from(&mut Cursor::new(text)),
            Err(LmpdatError::MissingAtomCount)
        ));
    }

    #[test]
    fn partial_box_yields_no_bounds() {
        let text = "title\n\n8 atoms\n-1 1 xlo xhi\n";
        let header = DataHeader::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(header.atoms, 8);
        assert!(header.bounds.is_none());
    }
}
