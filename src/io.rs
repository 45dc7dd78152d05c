// Input table reader, CSV writers, and the artifact layout of a run

use crate::config::{ColumnMapping, CovarianceType};
use crate::error::{DataError, LpaError, LpaResult};
use crate::selection::ModelSelectionTable;
use log::{debug, info};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header of the comparison table.
pub const COMPARISON_HEADER: &str = "aic,bic,n_components,log-likelihood,entropy";

/// Column appended to the labeled dataset.
pub const CLUSTER_COLUMN: &str = "cluster";

/// Parses a whitespace-delimited numeric table without header.
///
/// Blank lines are skipped. Line numbers in errors are one-based and count
/// every line of the source, blank ones included.
pub fn parse_whitespace_table<R: BufRead>(reader: R, source: &Path) -> LpaResult<Array2<f64>> {
    let mut values: Vec<f64> = Vec::new();
    let mut width: Option<usize> = None;
    let mut n_rows = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| LpaError::io(source, e))?;
        let line_no = idx + 1;
        let mut found = 0usize;
        for token in line.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| DataError::Parse {
                line: line_no,
                token: token.to_string(),
            })?;
            values.push(value);
            found += 1;
        }
        if found == 0 {
            continue;
        }
        match width {
            None => width = Some(found),
            Some(expected) if expected != found => {
                return Err(DataError::RaggedRow {
                    line: line_no,
                    expected,
                    found,
                }
                .into());
            }
            Some(_) => {}
        }
        n_rows += 1;
    }

    let n_cols = width.unwrap_or(0);
    if n_rows == 0 {
        return Err(DataError::EmptyMatrix {
            n_samples: 0,
            n_features: 0,
        }
        .into());
    }
    debug!("Parsed {} rows x {} columns from {:?}", n_rows, n_cols, source);
    Array2::from_shape_vec((n_rows, n_cols), values)
        .map_err(|e| LpaError::Config(format!("table shape error: {}", e)))
}

/// Reads a whitespace-delimited numeric table from `path`.
pub fn read_whitespace_table<P: AsRef<Path>>(path: P) -> LpaResult<Array2<f64>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| LpaError::io(path, e))?;
    parse_whitespace_table(BufReader::new(file), path)
}

/// Extracts the mapped columns, in mapping order.
pub fn select_columns(table: ArrayView2<f64>, mapping: &ColumnMapping) -> LpaResult<Array2<f64>> {
    mapping.validate()?;
    let available = table.ncols();
    if let Some(missing) = mapping.0.iter().find(|spec| spec.index >= available) {
        return Err(DataError::MissingColumn {
            name: missing.name.clone(),
            index: missing.index,
            available,
        }
        .into());
    }
    Ok(table.select(Axis(1), &mapping.indices()))
}

/// Reads `path` and keeps only the mapped columns.
pub fn load_observations<P: AsRef<Path>>(path: P, mapping: &ColumnMapping) -> LpaResult<Array2<f64>> {
    let path = path.as_ref();
    let table = read_whitespace_table(path)?;
    let selected = select_columns(table.view(), mapping)?;
    info!(
        "Loaded {} observations of {:?} from {:?}",
        selected.nrows(),
        mapping.names(),
        path
    );
    Ok(selected)
}

/// Writes the comparison table as CSV.
pub fn write_comparison_table<W: Write>(writer: &mut W, table: &ModelSelectionTable) -> std::io::Result<()> {
    writeln!(writer, "{}", COMPARISON_HEADER)?;
    for record in &table.records {
        writeln!(
            writer,
            "{},{},{},{},{}",
            record.aic, record.bic, record.n_components, record.log_likelihood, record.entropy
        )?;
    }
    Ok(())
}

/// Writes the observations with their names as header plus a `cluster` column.
pub fn write_labeled_dataset<W: Write>(
    writer: &mut W,
    data: ArrayView2<f64>,
    names: &[&str],
    labels: ArrayView1<usize>,
) -> LpaResult<()> {
    if names.len() != data.ncols() {
        return Err(DataError::DimensionMismatch {
            expected: data.ncols(),
            found: names.len(),
        }
        .into());
    }
    if labels.len() != data.nrows() {
        return Err(DataError::DimensionMismatch {
            expected: data.nrows(),
            found: labels.len(),
        }
        .into());
    }
    let write = |writer: &mut W| -> std::io::Result<()> {
        writeln!(writer, "{},{}", names.join(","), CLUSTER_COLUMN)?;
        for (row, label) in data.axis_iter(Axis(0)).zip(labels.iter()) {
            for value in row.iter() {
                write!(writer, "{},", value)?;
            }
            writeln!(writer, "{}", label)?;
        }
        Ok(())
    };
    write(writer).map_err(|e| LpaError::io("<labeled dataset>", e))
}

/// Locations of every artifact a run writes under its output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub output_dir: PathBuf,
    pub comparison_table: PathBuf,
    pub model_dir: PathBuf,
    pub model_file: PathBuf,
    pub labeled_dataset: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(output_dir: P, covariance_type: CovarianceType, n_components: usize) -> Self {
        let output_dir = output_dir.as_ref().to_path_buf();
        let prefix = format!("model_cov_{}", covariance_type);
        let model_dir = output_dir.join(&prefix);
        ArtifactPaths {
            comparison_table: output_dir.join("infoCriterion.csv"),
            model_file: model_dir.join(format!("{}.bin", prefix)),
            labeled_dataset: output_dir.join(format!("lpa_k{}.csv", n_components)),
            model_dir,
            output_dir,
        }
    }

    /// Creates the output and model directories if needed.
    pub fn create_dirs(&self) -> LpaResult<()> {
        fs::create_dir_all(&self.model_dir).map_err(|e| LpaError::io(&self.model_dir, e))
    }

    pub fn save_comparison_table(&self, table: &ModelSelectionTable) -> LpaResult<()> {
        let path = &self.comparison_table;
        let file = File::create(path).map_err(|e| LpaError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        write_comparison_table(&mut writer, table)
            .and_then(|_| writer.flush())
            .map_err(|e| LpaError::io(path, e))?;
        info!("Saved comparison table to {:?}", path);
        Ok(())
    }

    pub fn save_labeled_dataset(
        &self,
        data: ArrayView2<f64>,
        names: &[&str],
        labels: ArrayView1<usize>,
    ) -> LpaResult<()> {
        let path = &self.labeled_dataset;
        let file = File::create(path).map_err(|e| LpaError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        write_labeled_dataset(&mut writer, data, names, labels).map_err(|e| match e {
            LpaError::Io { source, .. } => LpaError::io(path, source),
            other => other,
        })?;
        writer.flush().map_err(|e| LpaError::io(path, e))?;
        info!("Saved labeled dataset to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnSpec;
    use crate::selection::ModelSelectionRecord;
    use ndarray::array;
    use std::io::Cursor;

    fn parse(text: &str) -> LpaResult<Array2<f64>> {
        parse_whitespace_table(Cursor::new(text), Path::new("mem"))
    }

    #[test]
    fn parses_mixed_whitespace_and_skips_blank_lines() {
        let table = parse("1 2\t3\n\n  4   5 6  \n   \n7 8 9\n").unwrap();
        assert_eq!(table, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
    }

    #[test]
    fn rejects_ragged_rows_with_line_number() {
        match parse("1 2 3\n\n4 5\n") {
            Err(LpaError::Data(DataError::RaggedRow {
                line,
                expected,
                found,
            })) => {
                assert_eq!((line, expected, found), (3, 3, 2));
            }
            other => panic!("expected RaggedRow, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unparsable_tokens() {
        match parse("1 2\n3 abc\n") {
            Err(LpaError::Data(DataError::Parse { line, token })) => {
                assert_eq!(line, 2);
                assert_eq!(token, "abc");
            }
            other => panic!("expected Parse, got {:?}", other),
        }
        assert!(matches!(
            parse("\n \n"),
            Err(LpaError::Data(DataError::EmptyMatrix { .. }))
        ));
    }

    #[test]
    fn selects_columns_in_mapping_order() {
        let table = array![[0.0, 1.0, 2.0, 3.0], [10.0, 11.0, 12.0, 13.0]];
        let mapping = ColumnMapping(vec![ColumnSpec::new("b", 3), ColumnSpec::new("a", 1)]);
        let selected = select_columns(table.view(), &mapping).unwrap();
        assert_eq!(selected, array![[3.0, 1.0], [13.0, 11.0]]);

        let default_mapping = ColumnMapping::default();
        match select_columns(table.view(), &default_mapping) {
            Err(LpaError::Data(DataError::MissingColumn { name, index, available })) => {
                assert_eq!(name, "ns");
                assert_eq!(index, 20);
                assert_eq!(available, 4);
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn comparison_table_has_documented_header() {
        let table = ModelSelectionTable {
            records: vec![ModelSelectionRecord {
                n_components: 2,
                aic: 10.5,
                bic: 12.25,
                log_likelihood: -3.0,
                entropy: 1.5,
            }],
            skipped: Vec::new(),
        };
        let mut out = Vec::new();
        write_comparison_table(&mut out, &table).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "aic,bic,n_components,log-likelihood,entropy");
        assert_eq!(lines[1], "10.5,12.25,2,-3,1.5");
    }

    #[test]
    fn labeled_dataset_appends_cluster_column() {
        let data = array![[0.5, -1.0], [2.0, 0.25]];
        let labels = array![1usize, 0];
        let mut out = Vec::new();
        write_labeled_dataset(&mut out, data.view(), &["m", "d"], labels.view()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "m,d,cluster\n0.5,-1,1\n2,0.25,0\n");

        let mut sink = Vec::new();
        assert!(matches!(
            write_labeled_dataset(&mut sink, data.view(), &["only"], labels.view()),
            Err(LpaError::Data(DataError::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn artifact_layout() {
        let paths = ArtifactPaths::new("results", CovarianceType::Diag, 5);
        assert_eq!(paths.comparison_table, Path::new("results/infoCriterion.csv"));
        assert_eq!(paths.model_dir, Path::new("results/model_cov_diag"));
        assert_eq!(paths.model_file, Path::new("results/model_cov_diag/model_cov_diag.bin"));
        assert_eq!(paths.labeled_dataset, Path::new("results/lpa_k5.csv"));
    }
}
