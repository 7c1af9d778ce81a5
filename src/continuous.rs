//! Continuous attribute encoder.
//!
//! Obs columns are stored as little-endian `float32`, gene expression vectors
//! as little-endian `float16`. `Min`/`Max` are taken over the stored (downcast)
//! values with NaN ignored; a vector without any non-NaN value reports NaN for
//! both, which serializes as JSON `null`. Values that overflow the stored type
//! become infinite in the buffer, their range entry is clamped to the largest
//! finite value of that type.

use crate::error::AttributeKind;
use crate::observer::{ExportObserver, Stage, StageReport};
use crate::source::DataSource;

use byteorder::{LittleEndian, WriteBytesExt};
use half::f16;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// Prefix of gene keys when the caller does not pick one
pub const DEFAULT_GENE_PREFIX: &str = "Gene";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuousSource {
    Obs,
    Gene,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatDtype {
    Float32,
    Float16,
}

impl FloatDtype {
    pub fn bytes(self) -> usize {
        match self {
            FloatDtype::Float32 => 4,
            FloatDtype::Float16 => 2,
        }
    }

    /// Largest finite value of the type
    pub fn max_finite(self) -> f64 {
        match self {
            FloatDtype::Float32 => f64::from(f32::MAX),
            FloatDtype::Float16 => f64::from(f16::MAX.to_f32()),
        }
    }
}

/// Range metadata of one continuous attribute
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContinuousDescriptor {
    pub source: ContinuousSource,
    #[serde(rename = "DType")]
    pub dtype: FloatDtype,
    /// NaN when the attribute has no non-NaN value
    #[serde(deserialize_with = "nan_when_null")]
    pub min: f64,
    #[serde(deserialize_with = "nan_when_null")]
    pub max: f64,
}

fn nan_when_null<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl ContinuousDescriptor {
    /// True for empty and all-NaN attributes
    pub fn is_undefined(&self) -> bool {
        self.min.is_nan() && self.max.is_nan()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodedContinuous {
    pub key: String,
    pub descriptor: ContinuousDescriptor,
    pub buffer: Vec<u8>,
}

/// Descriptors plus one float buffer per key
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContinuousBundle {
    pub descriptors: BTreeMap<String, ContinuousDescriptor>,
    pub buffers: BTreeMap<String, Vec<u8>>,
}

impl ContinuousBundle {
    fn insert(&mut self, encoded: EncodedContinuous) -> crate::Result<()> {
        if self.buffers.contains_key(&encoded.key) {
            return Err(crate::Error::KeyCollision(encoded.key));
        }
        self.descriptors.insert(encoded.key.clone(), encoded.descriptor);
        self.buffers.insert(encoded.key, encoded.buffer);
        Ok(())
    }

    pub fn total_bytes(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }
}

/// Min and max ignoring NaN, `(NaN, NaN)` when nothing is left
pub fn nan_range<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((f64::NAN, f64::NAN), |(lo, hi), v| {
            // f64::min/max return the non-NaN operand
            (lo.min(v), hi.max(v))
        })
}

/// [nan_range] of values stored as `dtype`, infinities clamped to its finite range
fn stored_range<I: IntoIterator<Item = f64>>(values: I, dtype: FloatDtype) -> (f64, f64) {
    let limit = dtype.max_finite();
    nan_range(values.into_iter().map(|v| v.clamp(-limit, limit)))
}

/// Key of a gene attribute
pub fn gene_key(prefix: &str, gene: &str) -> String {
    format!("{prefix}:{gene}")
}

/// Encodes the numeric obs column `key` as `float32`
pub fn encode_obs(
    source: &dyn DataSource,
    key: &str,
    observer: &dyn ExportObserver,
) -> crate::Result<EncodedContinuous> {
    let start = Instant::now();
    let column = source
        .column(key)
        .ok_or_else(|| crate::Error::missing(AttributeKind::ObsColumn, key))?;
    let values = column.as_f64().ok_or_else(|| crate::Error::TypeMismatch {
        key: key.to_string(),
        found: column.type_name(),
    })?;
    crate::Error::check_len(key, source.n_obs(), values.len())?;

    let stored: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    let mut buffer = Vec::with_capacity(stored.len() * FloatDtype::Float32.bytes());
    for &v in &stored {
        buffer.write_f32::<LittleEndian>(v)?;
    }
    let (min, max) = stored_range(stored.iter().map(|&v| f64::from(v)), FloatDtype::Float32);

    observer.report(&StageReport {
        stage: Stage::ContinuousObs,
        key,
        bytes: buffer.len(),
        elapsed: start.elapsed(),
    });
    log::debug!("continuous obs '{}': min={} max={}", key, min, max);

    Ok(EncodedContinuous {
        key: key.to_string(),
        descriptor: ContinuousDescriptor {
            source: ContinuousSource::Obs,
            dtype: FloatDtype::Float32,
            min,
            max,
        },
        buffer,
    })
}

/// Encodes the expression of `gene` as `float16` under `"<prefix>:<gene>"`.
///
/// `layer` selects an expression layer, `None` the default matrix.
pub fn encode_gene(
    source: &dyn DataSource,
    gene: &str,
    layer: Option<&str>,
    prefix: &str,
    observer: &dyn ExportObserver,
) -> crate::Result<EncodedContinuous> {
    let start = Instant::now();
    let layer_name = layer.unwrap_or("X");
    let matrix = source
        .expression(layer)
        .ok_or_else(|| crate::Error::missing(AttributeKind::Layer, layer_name))?;
    matrix
        .validate()
        .map_err(|reason| crate::Error::MalformedMatrix {
            layer: layer_name.to_string(),
            reason,
        })?;
    crate::Error::check_len(layer_name, source.n_obs(), matrix.n_obs())?;
    let column = source
        .var_index(gene)
        .and_then(|idx| matrix.gene_column(idx))
        .ok_or_else(|| crate::Error::missing(AttributeKind::Gene, gene))?;

    let stored: Vec<f16> = column.iter().map(|&v| f16::from_f32(v)).collect();
    let mut buffer = Vec::with_capacity(stored.len() * FloatDtype::Float16.bytes());
    for v in &stored {
        buffer.write_u16::<LittleEndian>(v.to_bits())?;
    }
    let (min, max) = stored_range(
        stored.iter().map(|v| f64::from(v.to_f32())),
        FloatDtype::Float16,
    );

    let key = gene_key(prefix, gene);
    observer.report(&StageReport {
        stage: Stage::ContinuousGene,
        key: &key,
        bytes: buffer.len(),
        elapsed: start.elapsed(),
    });
    log::debug!("continuous gene '{}': min={} max={}", key, min, max);

    Ok(EncodedContinuous {
        key,
        descriptor: ContinuousDescriptor {
            source: ContinuousSource::Gene,
            dtype: FloatDtype::Float16,
            min,
            max,
        },
        buffer,
    })
}

fn dedup<'a>(keys: &'a [String]) -> impl Iterator<Item = &'a str> {
    let mut seen = HashSet::new();
    keys.iter()
        .map(String::as_str)
        .filter(move |key| seen.insert(*key))
}

/// Encodes `obs_keys` and then `genes` into one bundle, stopping at the first error
pub fn encode_continuous(
    source: &dyn DataSource,
    obs_keys: &[String],
    genes: &[String],
    layer: Option<&str>,
    prefix: &str,
    observer: &dyn ExportObserver,
) -> crate::Result<ContinuousBundle> {
    let start = Instant::now();
    let mut bundle = ContinuousBundle::default();
    for key in dedup(obs_keys) {
        bundle.insert(encode_obs(source, key, observer)?)?;
    }
    for gene in dedup(genes) {
        bundle.insert(encode_gene(source, gene, layer, prefix, observer)?)?;
    }

    observer.report(&StageReport {
        stage: Stage::ContinuousBatch,
        key: &format!("{} keys", bundle.buffers.len()),
        bytes: bundle.total_bytes(),
        elapsed: start.elapsed(),
    });
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::source::{ExpressionMatrix, InMemoryDataset};
    use proptest::prelude::*;

    fn genes_dataset() -> InMemoryDataset {
        // 5 cells x 2 genes, Zero is never expressed
        InMemoryDataset::new(5)
            .with_var_names(["Actb", "Zero"])
            .with_matrix(ExpressionMatrix::Csr {
                n_obs: 5,
                n_vars: 2,
                indptr: vec![0, 1, 1, 2, 2, 3],
                indices: vec![0, 0, 0],
                data: vec![1.5, 3.0, 0.25],
            })
            .with_layer(
                "raw",
                ExpressionMatrix::Dense {
                    n_obs: 5,
                    n_vars: 2,
                    values: vec![10.0, 0.0, 20.0, 0.0, 30.0, 0.0, 40.0, 0.0, 50.0, 0.0],
                },
            )
    }

    fn f32s(buffer: &[u8]) -> Vec<f32> {
        buffer
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn f16s(buffer: &[u8]) -> Vec<f32> {
        buffer
            .chunks_exact(2)
            .map(|c| f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
            .collect()
    }

    #[test]
    fn obs_column_keeps_nan_in_buffer() {
        let ds = InMemoryDataset::new(3).with_column("score", vec![1.0, f64::NAN, 3.0]);
        let encoded = encode_obs(&ds, "score", &NoopObserver).unwrap();
        assert_eq!(encoded.buffer.len(), 12);
        let values = f32s(&encoded.buffer);
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 3.0);
        assert_eq!(encoded.descriptor.min, 1.0);
        assert_eq!(encoded.descriptor.max, 3.0);
        assert_eq!(encoded.descriptor.source, ContinuousSource::Obs);
        assert_eq!(encoded.descriptor.dtype, FloatDtype::Float32);
    }

    #[test]
    fn integer_obs_is_numeric() {
        let ds = InMemoryDataset::new(2).with_column("count", vec![4i64, -2]);
        let encoded = encode_obs(&ds, "count", &NoopObserver).unwrap();
        assert_eq!(f32s(&encoded.buffer), [4.0, -2.0]);
        assert_eq!((encoded.descriptor.min, encoded.descriptor.max), (-2.0, 4.0));
    }

    #[test]
    fn text_obs_is_a_type_mismatch() {
        let ds = InMemoryDataset::new(1)
            .with_column("label", vec!["a"])
            .with_column("flag", vec![true]);
        assert!(matches!(
            encode_obs(&ds, "label", &NoopObserver),
            Err(crate::Error::TypeMismatch { found: "text", .. })
        ));
        assert!(matches!(
            encode_obs(&ds, "flag", &NoopObserver),
            Err(crate::Error::TypeMismatch { found: "boolean", .. })
        ));
    }

    #[test]
    fn all_nan_and_empty_use_the_sentinel() {
        let nan = InMemoryDataset::new(2).with_column("v", vec![f64::NAN, f64::NAN]);
        let empty = InMemoryDataset::new(0).with_column("v", Vec::<f64>::new());
        for ds in [nan, empty] {
            let encoded = encode_obs(&ds, "v", &NoopObserver).unwrap();
            assert!(encoded.descriptor.is_undefined());
        }
    }

    #[test]
    fn obs_length_must_match_points() {
        let ds = InMemoryDataset::new(3).with_column("score", vec![1.0, 2.0]);
        assert!(matches!(
            encode_obs(&ds, "score", &NoopObserver),
            Err(crate::Error::LengthMismatch { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn overflowing_gene_keeps_a_finite_range() {
        let ds = InMemoryDataset::new(3)
            .with_var_names(["Hot"])
            .with_matrix(ExpressionMatrix::Dense {
                n_obs: 3,
                n_vars: 1,
                values: vec![1.0, 1.0e6, -2.0e5],
            });
        let encoded = encode_gene(&ds, "Hot", None, "Gene", &NoopObserver).unwrap();
        let stored = f16s(&encoded.buffer);
        assert_eq!(stored[0], 1.0);
        assert_eq!(stored[1], f32::INFINITY);
        assert_eq!(stored[2], f32::NEG_INFINITY);

        let d = encoded.descriptor;
        assert!(!d.is_undefined());
        assert_eq!(d.max, 65504.0);
        assert_eq!(d.min, -65504.0);
        let json = serde_json::to_value(d).unwrap();
        assert_eq!(json["Max"], serde_json::json!(65504.0));
    }

    #[test]
    fn gene_matrix_is_checked() {
        let short = InMemoryDataset::new(3)
            .with_var_names(["Actb"])
            .with_matrix(ExpressionMatrix::Dense {
                n_obs: 3,
                n_vars: 1,
                values: vec![1.0, 2.0],
            });
        assert!(matches!(
            encode_gene(&short, "Actb", None, "Gene", &NoopObserver),
            Err(crate::Error::MalformedMatrix { ref layer, .. }) if layer == "X"
        ));

        let fewer_cells = InMemoryDataset::new(4)
            .with_var_names(["Actb"])
            .with_layer(
                "counts",
                ExpressionMatrix::Csc {
                    n_obs: 2,
                    n_vars: 1,
                    indptr: vec![0, 1],
                    indices: vec![1],
                    data: vec![5.0],
                },
            );
        assert!(matches!(
            encode_gene(&fewer_cells, "Actb", Some("counts"), "Gene", &NoopObserver),
            Err(crate::Error::LengthMismatch { ref key, expected: 4, found: 2 }) if key == "counts"
        ));
    }

    #[test]
    fn zero_gene_is_not_undefined() {
        let ds = genes_dataset();
        let encoded = encode_gene(&ds, "Zero", None, DEFAULT_GENE_PREFIX, &NoopObserver).unwrap();
        assert_eq!(encoded.key, "Gene:Zero");
        assert_eq!(encoded.buffer, vec![0u8; 10]);
        assert_eq!(encoded.descriptor.min, 0.0);
        assert_eq!(encoded.descriptor.max, 0.0);
        assert!(!encoded.descriptor.is_undefined());
    }

    #[test]
    fn sparse_gene_is_densified_to_float16() {
        let ds = genes_dataset();
        let encoded = encode_gene(&ds, "Actb", None, "Expr", &NoopObserver).unwrap();
        assert_eq!(encoded.key, "Expr:Actb");
        assert_eq!(f16s(&encoded.buffer), [1.5, 0.0, 3.0, 0.0, 0.25]);
        assert_eq!(encoded.descriptor.dtype, FloatDtype::Float16);
        assert_eq!((encoded.descriptor.min, encoded.descriptor.max), (0.0, 3.0));
    }

    #[test]
    fn layer_selects_matrix() {
        let ds = genes_dataset();
        let encoded = encode_gene(&ds, "Actb", Some("raw"), "Gene", &NoopObserver).unwrap();
        assert_eq!(f16s(&encoded.buffer), [10.0, 20.0, 30.0, 40.0, 50.0]);

        assert!(matches!(
            encode_gene(&ds, "Actb", Some("counts"), "Gene", &NoopObserver),
            Err(crate::Error::MissingAttribute { kind: AttributeKind::Layer, ref key }) if key == "counts"
        ));
    }

    #[test]
    fn missing_gene() {
        let ds = genes_dataset();
        assert!(matches!(
            encode_gene(&ds, "Gapdh", None, "Gene", &NoopObserver),
            Err(crate::Error::MissingAttribute { kind: AttributeKind::Gene, ref key }) if key == "Gapdh"
        ));
        let bare = InMemoryDataset::new(0);
        assert!(matches!(
            encode_gene(&bare, "Actb", None, "Gene", &NoopObserver),
            Err(crate::Error::MissingAttribute { kind: AttributeKind::Layer, ref key }) if key == "X"
        ));
    }

    #[test]
    fn gene_keys_never_shadow_obs_keys() {
        let ds = genes_dataset().with_column("Actb", vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let bundle = encode_continuous(
            &ds,
            &["Actb".to_string(), "Actb".to_string()],
            &["Actb".to_string()],
            None,
            DEFAULT_GENE_PREFIX,
            &NoopObserver,
        )
        .unwrap();
        let keys: Vec<_> = bundle.descriptors.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Actb", "Gene:Actb"]);
        assert_eq!(bundle.buffers.len(), 2);
        assert_eq!(bundle.buffers["Actb"].len(), 20);
        assert_eq!(bundle.buffers["Gene:Actb"].len(), 10);
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let ds = genes_dataset().with_column("Gene:Actb", vec![0.0; 5]);
        assert!(matches!(
            encode_continuous(
                &ds,
                &["Gene:Actb".to_string()],
                &["Actb".to_string()],
                None,
                DEFAULT_GENE_PREFIX,
                &NoopObserver,
            ),
            Err(crate::Error::KeyCollision(ref key)) if key == "Gene:Actb"
        ));
    }

    #[test]
    fn descriptor_json_shape() {
        let d = ContinuousDescriptor {
            source: ContinuousSource::Gene,
            dtype: FloatDtype::Float16,
            min: 0.0,
            max: 2.5,
        };
        assert_eq!(
            serde_json::to_value(d).unwrap(),
            serde_json::json!({"Source": "gene", "DType": "float16", "Min": 0.0, "Max": 2.5})
        );
        let undefined = ContinuousDescriptor {
            min: f64::NAN,
            max: f64::NAN,
            ..d
        };
        let json = serde_json::to_string(&undefined).unwrap();
        assert!(json.contains("\"Min\":null"));
        let back: ContinuousDescriptor = serde_json::from_str(&json).unwrap();
        assert!(back.is_undefined());
    }

    proptest! {
        #[test]
        fn range_covers_every_stored_value(
            values in prop::collection::vec(
                prop_oneof![Just(f64::NAN), -1.0e6f64..1.0e6],
                1..64,
            )
        ) {
            let ds = InMemoryDataset::new(values.len()).with_column("v", values.clone());
            let encoded = encode_obs(&ds, "v", &NoopObserver).unwrap();
            let d = encoded.descriptor;
            if values.iter().all(|v| v.is_nan()) {
                prop_assert!(d.is_undefined());
            } else {
                prop_assert!(d.min <= d.max);
                for v in f32s(&encoded.buffer).into_iter().filter(|v| !v.is_nan()) {
                    prop_assert!(d.min <= f64::from(v) && f64::from(v) <= d.max);
                }
            }
        }

        #[test]
        fn gene_range_is_finite_unless_undefined(
            values in prop::collection::vec(
                prop_oneof![Just(f32::NAN), -1.0e6f32..1.0e6],
                1..64,
            )
        ) {
            let n = values.len();
            let ds = InMemoryDataset::new(n)
                .with_var_names(["g"])
                .with_matrix(ExpressionMatrix::Dense { n_obs: n, n_vars: 1, values: values.clone() });
            let d = encode_gene(&ds, "g", None, "Gene", &NoopObserver).unwrap().descriptor;
            if values.iter().all(|v| v.is_nan()) {
                prop_assert!(d.is_undefined());
            } else {
                prop_assert!(d.min.is_finite() && d.max.is_finite());
                prop_assert!(-65504.0 <= d.min && d.min <= d.max && d.max <= 65504.0);
            }
        }
    }
}
