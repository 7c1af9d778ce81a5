//! Data source boundary.
//!
//! The encoders never see a concrete table library. They read through
//! [DataSource], which any in-memory backend can implement; [InMemoryDataset]
//! is the one shipped with the crate.

use std::collections::HashMap;

/// N points in 2 or 3 dimensions, row-major
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateMatrix {
    n_rows: usize,
    n_cols: usize,
    values: Vec<f64>,
}

impl CoordinateMatrix {
    /// Wraps a row-major buffer.
    ///
    /// `values.len()` must equal `n_rows * n_cols`; a zero column count is
    /// accepted here and rejected by the encoder.
    pub fn new(n_rows: usize, n_cols: usize, values: Vec<f64>) -> Option<Self> {
        if n_rows.checked_mul(n_cols)? != values.len() {
            return None;
        }
        Some(CoordinateMatrix {
            n_rows,
            n_cols,
            values,
        })
    }

    /// Builds a matrix from fixed-width rows
    pub fn from_rows<const D: usize>(rows: &[[f64; D]]) -> Self {
        CoordinateMatrix {
            n_rows: rows.len(),
            n_cols: D,
            values: rows.iter().flatten().copied().collect(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on 0
        self.values.chunks_exact(self.n_cols.max(1))
    }
}

/// One named per-point column
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Text(Vec<String>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the value type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Text(_) => "text",
            Column::Int(_) => "integer",
            Column::Float(_) => "float",
            Column::Bool(_) => "boolean",
        }
    }

    /// Numeric view of the column, `None` for text and boolean columns
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Float(v) => Some(v.clone()),
            Column::Text(_) | Column::Bool(_) => None,
        }
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Column::Text(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Text(v.into_iter().map(String::from).collect())
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Int(v)
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Float(v)
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Column::Bool(v)
    }
}

/// cells × genes expression values
#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionMatrix {
    /// Row-major, `values[cell * n_vars + gene]`
    Dense {
        n_obs: usize,
        n_vars: usize,
        values: Vec<f32>,
    },
    /// Compressed sparse rows, one row per cell
    Csr {
        n_obs: usize,
        n_vars: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f32>,
    },
    /// Compressed sparse columns, one column per gene
    Csc {
        n_obs: usize,
        n_vars: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f32>,
    },
}

impl ExpressionMatrix {
    pub fn n_obs(&self) -> usize {
        match self {
            ExpressionMatrix::Dense { n_obs, .. }
            | ExpressionMatrix::Csr { n_obs, .. }
            | ExpressionMatrix::Csc { n_obs, .. } => *n_obs,
        }
    }

    pub fn n_vars(&self) -> usize {
        match self {
            ExpressionMatrix::Dense { n_vars, .. }
            | ExpressionMatrix::Csr { n_vars, .. }
            | ExpressionMatrix::Csc { n_vars, .. } => *n_vars,
        }
    }

    /// Checks that the buffers agree with the declared shape.
    ///
    /// Sparse layouts need `indptr` of length major + 1, non-decreasing and
    /// ending at `indices.len() == data.len()`, with every index inside the
    /// minor dimension. Indices need not be sorted.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            ExpressionMatrix::Dense {
                n_obs,
                n_vars,
                values,
            } => {
                if n_obs.checked_mul(*n_vars) != Some(values.len()) {
                    return Err("dense values do not match n_obs x n_vars");
                }
                Ok(())
            }
            ExpressionMatrix::Csr {
                n_obs,
                n_vars,
                indptr,
                indices,
                data,
            } => validate_compressed(*n_obs, *n_vars, indptr, indices, data),
            ExpressionMatrix::Csc {
                n_obs,
                n_vars,
                indptr,
                indices,
                data,
            } => validate_compressed(*n_vars, *n_obs, indptr, indices, data),
        }
    }

    /// Dense copy of one gene's column, one value per cell.
    ///
    /// Returns `None` when `gene` is out of range or the matrix fails
    /// [ExpressionMatrix::validate]. Missing entries of the sparse layouts are
    /// zero, duplicate entries are summed.
    pub fn gene_column(&self, gene: usize) -> Option<Vec<f32>> {
        if gene >= self.n_vars() || self.validate().is_err() {
            return None;
        }
        let column = match self {
            ExpressionMatrix::Dense {
                n_obs,
                n_vars,
                values,
            } => (0..*n_obs).map(|cell| values[cell * n_vars + gene]).collect(),
            ExpressionMatrix::Csr {
                indptr,
                indices,
                data,
                ..
            } => indptr
                .windows(2)
                .map(|row| {
                    let (start, end) = (row[0], row[1]);
                    indices[start..end]
                        .iter()
                        .zip(&data[start..end])
                        .filter(|&(&var, _)| var == gene)
                        .map(|(_, &value)| value)
                        .sum::<f32>()
                })
                .collect(),
            ExpressionMatrix::Csc {
                n_obs,
                indptr,
                indices,
                data,
                ..
            } => {
                let mut column = vec![0.0; *n_obs];
                for k in indptr[gene]..indptr[gene + 1] {
                    column[indices[k]] += data[k];
                }
                column
            }
        };
        Some(column)
    }
}

fn validate_compressed(
    major: usize,
    minor: usize,
    indptr: &[usize],
    indices: &[usize],
    data: &[f32],
) -> Result<(), &'static str> {
    if indptr.len() != major + 1 {
        return Err("indptr length does not match the matrix shape");
    }
    if indptr.first() != Some(&0) || indptr.windows(2).any(|w| w[0] > w[1]) {
        return Err("indptr is not a non-decreasing run from 0");
    }
    if indptr.last() != Some(&indices.len()) || indices.len() != data.len() {
        return Err("indptr, indices and data disagree on the entry count");
    }
    if indices.iter().any(|&i| i >= minor) {
        return Err("index outside the matrix");
    }
    Ok(())
}

/// Read access to a spatial dataset
pub trait DataSource {
    /// Number of points (cells).
    ///
    /// Coordinate matrices, columns and expression matrices are expected to
    /// hold one row per point; the encoders reject any that do not.
    fn n_obs(&self) -> usize;

    /// Coordinate matrix stored under `key`
    fn coordinates(&self, key: &str) -> Option<&CoordinateMatrix>;

    /// Per-point column stored under `name`
    fn column(&self, name: &str) -> Option<&Column>;

    /// Expression matrix of `layer`, or the default matrix for `None`
    fn expression(&self, layer: Option<&str>) -> Option<&ExpressionMatrix>;

    /// Position of `gene` in the variable-name index
    fn var_index(&self, gene: &str) -> Option<usize>;
}

/// Plain in-memory [DataSource]
#[derive(Clone, Debug, Default)]
pub struct InMemoryDataset {
    n_obs: usize,
    coordinates: HashMap<String, CoordinateMatrix>,
    columns: HashMap<String, Column>,
    var_lookup: HashMap<String, usize>,
    matrix: Option<ExpressionMatrix>,
    layers: HashMap<String, ExpressionMatrix>,
}

impl InMemoryDataset {
    pub fn new(n_obs: usize) -> Self {
        InMemoryDataset {
            n_obs,
            ..Default::default()
        }
    }

    pub fn with_coordinates(mut self, key: impl Into<String>, matrix: CoordinateMatrix) -> Self {
        self.coordinates.insert(key.into(), matrix);
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, column: impl Into<Column>) -> Self {
        self.columns.insert(name.into(), column.into());
        self
    }

    /// Sets the variable-name index; the first occurrence of a name wins
    pub fn with_var_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.var_lookup.clear();
        for (i, name) in names.into_iter().enumerate() {
            self.var_lookup.entry(name.into()).or_insert(i);
        }
        self
    }

    pub fn with_matrix(mut self, matrix: ExpressionMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    pub fn with_layer(mut self, name: impl Into<String>, matrix: ExpressionMatrix) -> Self {
        self.layers.insert(name.into(), matrix);
        self
    }
}

impl DataSource for InMemoryDataset {
    fn n_obs(&self) -> usize {
        self.n_obs
    }

    fn coordinates(&self, key: &str) -> Option<&CoordinateMatrix> {
        self.coordinates.get(key)
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    fn expression(&self, layer: Option<&str>) -> Option<&ExpressionMatrix> {
        match layer {
            Some(layer) => self.layers.get(layer),
            None => self.matrix.as_ref(),
        }
    }

    fn var_index(&self, gene: &str) -> Option<usize> {
        self.var_lookup.get(gene).copied()
    }
}
