//! Plain-text input and output of samples, centroids and assignments.
//!
//! Input files hold one value per line. Only the first token of a line is read, where tokens are
//! separated by `,`, `;`, spaces or tabs; blank lines are skipped. Output files are written one
//! value per line as well, floats with six decimals.

use crate::{memory::*, KMeansError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

fn first_token(line: &str) -> Option<&str> {
    line.split(|c| matches!(c, ',' | ';' | ' ' | '\t' | '\r'))
        .find(|token| !token.is_empty())
}

/// Read one value per non-blank line. An empty file is an error.
fn load_values<T: Primitive>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => KMeansError::InputFileNotFound { path: path.to_path_buf() },
        _ => KMeansError::InputUnreadable { path: path.to_path_buf(), source },
    })?;

    let mut values = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| KMeansError::InputUnreadable { path: path.to_path_buf(), source })?;
        let Some(token) = first_token(&line) else { continue };
        let malformed = || KMeansError::MalformedValue {
            path: path.to_path_buf(),
            line: idx + 1,
            token: token.to_string(),
        };
        let value: f64 = token.parse().map_err(|_| malformed())?;
        if !value.is_finite() {
            return Err(malformed());
        }
        values.push(T::from_wire(value));
    }

    if values.is_empty() {
        return Err(KMeansError::EmptyInput { path: path.to_path_buf() });
    }
    Ok(values)
}

pub fn load_samples<T: Primitive>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    load_values(path.as_ref())
}

/// Load the initial centroid vector; its length determines **k**.
pub fn load_initial_centroids<T: Primitive>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    load_values(path.as_ref())
}

fn store_lines<V>(path: &Path, values: impl IntoIterator<Item = V>, write: impl Fn(&mut BufWriter<File>, V) -> std::io::Result<()>) -> Result<()> {
    let wrap = |source: std::io::Error| KMeansError::OutputUnwritable { path: path.to_path_buf(), source };
    let mut out = BufWriter::new(File::create(path).map_err(wrap)?);
    for value in values {
        write(&mut out, value).map_err(wrap)?;
    }
    out.flush().map_err(wrap)
}

/// Write one cluster id per line, in sample order.
pub fn store_assignments(path: impl AsRef<Path>, assignments: &[usize]) -> Result<()> {
    store_lines(path.as_ref(), assignments, |out, a| writeln!(out, "{}", a))
}

/// Write one value per line with six decimals.
pub fn store_values<T: Primitive>(path: impl AsRef<Path>, values: &[T]) -> Result<()> {
    store_lines(path.as_ref(), values, |out, v| writeln!(out, "{:.6}", v))
}

pub fn store_centroids<T: Primitive>(path: impl AsRef<Path>, centroids: &[T]) -> Result<()> {
    store_values(path, centroids)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_first_token_per_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "samples.csv", "1.5\n\n  \n2.0,7\n3;x\n-4e2\tfoo\r\n 5 \n");
        let values: Vec<f64> = load_samples(&path).unwrap();
        assert_eq!(values, vec![1.5, 2.0, 3.0, -400.0, 5.0]);
    }

    #[test]
    fn missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_samples::<f64>(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, KMeansError::InputFileNotFound { .. }));
    }

    #[test]
    fn malformed_value_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "centroids.csv", "1.0\n\nabc\n");
        match load_initial_centroids::<f32>(&path) {
            Err(KMeansError::MalformedValue { line, token, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(token, "abc");
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        for (name, token) in [("nan.csv", "nan"), ("inf.csv", "inf"), ("neg.csv", "-infinity"), ("huge.csv", "1e400")] {
            let path = write_file(&dir, name, &format!("1.0\n{}\n", token));
            match load_samples::<f64>(&path) {
                Err(KMeansError::MalformedValue { line, token: found, .. }) => {
                    assert_eq!(line, 2);
                    assert_eq!(found, token);
                },
                other => panic!("unexpected result for {}: {:?}", token, other),
            }
        }
    }

    #[test]
    fn empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.csv", "\n \n");
        assert!(matches!(load_samples::<f64>(&path), Err(KMeansError::EmptyInput { .. })));
    }

    #[test]
    fn writes_outputs() {
        let dir = TempDir::new().unwrap();
        let centroids = dir.path().join("centroids.txt");
        let assignments = dir.path().join("assignments.txt");

        store_centroids(&centroids, &[2.0f64, 11.123_456_789]).unwrap();
        store_assignments(&assignments, &[0, 0, 1]).unwrap();

        assert_eq!(fs::read_to_string(&centroids).unwrap(), "2.000000\n11.123457\n");
        assert_eq!(fs::read_to_string(&assignments).unwrap(), "0\n0\n1\n");
        assert_eq!(load_initial_centroids::<f64>(&centroids).unwrap(), vec![2.0, 11.123457]);
    }

    #[test]
    fn unwritable_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("out.txt");
        assert!(matches!(store_assignments(&path, &[1]), Err(KMeansError::OutputUnwritable { .. })));
    }
}
