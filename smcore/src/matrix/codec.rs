//! Text encoding of symmetric distance matrices as their strictly lower triangle.
//!
//! Line `i` (starting at 1) holds the `i` comma separated values `M[i][0..i]`. The trivial
//! row 0 is not written, so an `n x n` matrix takes `n - 1` lines. Blank lines are skipped on
//! read and the full matrix is restored by mirroring the triangle.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use nalgebra::DMatrix;

use crate::data::distance_matrix::DistanceMatrix;
use crate::error::{CoreError, Result};

/// Writes the strictly lower triangle of `matrix`.
///
/// # Example
///
/// ```rust
/// # use nalgebra::DMatrix;
/// # use smcore::data::distance_matrix::DistanceMatrix;
/// # use smcore::matrix::codec::write_triangular;
/// let m = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 2.0, 1.0, 0.0, 3.0, 2.0, 3.0, 0.0]);
/// let mut out = Vec::new();
/// write_triangular(&DistanceMatrix::from_dmatrix(m).unwrap(), &mut out).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "1\n2,3\n");
/// ```
pub fn write_triangular<W: Write>(matrix: &DistanceMatrix, mut writer: W) -> Result<()> {
    for i in 1..matrix.len() {
        let row: Vec<String> = (0..i).map(|j| format!("{}", matrix.get(i, j))).collect();
        writeln!(writer, "{}", row.join(","))?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a strictly lower triangle and rebuilds the symmetric matrix.
///
/// # Errors
///
/// `MatrixParse` for values that are not numbers, `InputShape` when line `i` does not hold
/// exactly `i` values, `InvalidDistance` for negative or non-finite values.
pub fn read_triangular<R: BufRead>(reader: R) -> Result<DistanceMatrix> {
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let row = line.split(',')
            .map(|token| {
                let token = token.trim();
                token.parse::<f64>().map_err(|_| CoreError::MatrixParse {
                    line: line_index + 1,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let expected = rows.len() + 1;
        if row.len() != expected {
            return Err(CoreError::InputShape(format!(
                "triangular row {} holds {} values, expected {}",
                expected,
                row.len(),
                expected
            )));
        }
        rows.push(row);
    }

    let n = rows.len() + 1;
    let mut values = DMatrix::zeros(n, n);
    for (k, row) in rows.iter().enumerate() {
        let i = k + 1;
        for (j, value) in row.iter().enumerate() {
            if !value.is_finite() || *value < 0.0 {
                return Err(CoreError::InvalidDistance { i, j, value: *value });
            }
            values[(i, j)] = *value;
            values[(j, i)] = *value;
        }
    }

    Ok(DistanceMatrix::from_trusted(values))
}

pub fn save_matrix(matrix: &DistanceMatrix, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_triangular(matrix, BufWriter::new(file))?;
    info!("wrote {}x{} distance matrix to {}", matrix.len(), matrix.len(), path.display());
    Ok(())
}

pub fn load_matrix(path: impl AsRef<Path>) -> Result<DistanceMatrix> {
    let path = path.as_ref();
    let matrix = read_triangular(BufReader::new(File::open(path)?))?;
    info!("read {}x{} distance matrix from {}", matrix.len(), matrix.len(), path.display());
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> DistanceMatrix {
        let m = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 2.0, 1.0, 0.0, 3.0, 2.0, 3.0, 0.0]);
        DistanceMatrix::from_dmatrix(m).unwrap()
    }

    #[test]
    fn test_three_by_three() {
        let mut out = Vec::new();
        write_triangular(&example(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "1\n2,3\n");
        assert_eq!(read_triangular(text.as_bytes()).unwrap(), example());
    }

    #[test]
    fn test_leading_blank_line_accepted() {
        let decoded = read_triangular("\n1\n2,3\n".as_bytes()).unwrap();
        assert_eq!(decoded, example());
    }

    #[test]
    fn test_round_trip_rounded_values() {
        for n in [1usize, 2, 7, 50] {
            let values = DMatrix::from_fn(n, n, |i, j| {
                if i == j {
                    0.0
                } else {
                    let (a, b) = (i.min(j) as f64, i.max(j) as f64);
                    ((a * 0.731 + b * 0.117).fract() * 1e6).round() / 1e6
                }
            });
            let matrix = DistanceMatrix::from_dmatrix(values).unwrap();
            let mut out = Vec::new();
            write_triangular(&matrix, &mut out).unwrap();
            assert_eq!(read_triangular(out.as_slice()).unwrap(), matrix);
        }
    }

    #[test]
    fn test_empty_stream() {
        let decoded = read_triangular("".as_bytes()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.get(0, 0), 0.0);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            read_triangular("1\n2,x\n".as_bytes()),
            Err(CoreError::MatrixParse { line: 2, .. })
        ));
        assert!(matches!(read_triangular("1\n2\n".as_bytes()), Err(CoreError::InputShape(_))));
        assert!(matches!(read_triangular("-1\n".as_bytes()), Err(CoreError::InvalidDistance { .. })));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.csv");
        save_matrix(&example(), &path).unwrap();
        assert_eq!(load_matrix(&path).unwrap(), example());
    }
}
