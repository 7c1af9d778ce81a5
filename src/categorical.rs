//! Categorical attribute encoder.
//!
//! Every distinct value of a column gets a dense integer code. Codes follow
//! the sorted order of the distinct values ([ORDERING_POLICY]): text
//! lexicographically by UTF-8 bytes, integers numerically, floats by IEEE-754
//! total order, booleans `false < true`. The order is part of the wire format;
//! consumers index the schema by code.

use crate::color::color_of;
use crate::error::AttributeKind;
use crate::observer::{ExportObserver, Stage, StageReport};
use crate::source::{Column, DataSource};

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::Instant;

/// How codes are assigned to distinct values
pub const ORDERING_POLICY: &str = "sorted";

/// Integer width of a code buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CodeWidth {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "uint32")]
    U32,
}

impl CodeWidth {
    /// Smallest width whose unsigned range holds `category_count` codes
    pub fn for_category_count(category_count: usize) -> Self {
        if category_count < 1 << 8 {
            CodeWidth::U8
        } else if category_count < 1 << 16 {
            CodeWidth::U16
        } else {
            CodeWidth::U32
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            CodeWidth::U8 => 1,
            CodeWidth::U16 => 2,
            CodeWidth::U32 => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CodeWidth::U8 => "uint8",
            CodeWidth::U16 => "uint16",
            CodeWidth::U32 => "uint32",
        }
    }

    /// Little-endian code buffer
    pub fn pack(self, codes: &[u32]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(codes.len() * self.bytes());
        for &code in codes {
            // Vec<u8> writes are infallible
            let _ = match self {
                CodeWidth::U8 => buf.write_u8(code as u8),
                CodeWidth::U16 => buf.write_u16::<LittleEndian>(code as u16),
                CodeWidth::U32 => buf.write_u32::<LittleEndian>(code),
            };
        }
        buf
    }

    /// Reads back a buffer written by [pack](Self::pack)
    pub fn unpack(self, bytes: &[u8]) -> Vec<u32> {
        match self {
            CodeWidth::U8 => bytes.iter().map(|&b| u32::from(b)).collect(),
            CodeWidth::U16 => bytes
                .chunks_exact(2)
                .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            CodeWidth::U32 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}

impl fmt::Display for CodeWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One distinct value of a categorical column
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoryItem {
    pub name: String,
    pub code: u32,
    pub color: [u8; 3],
}

/// Distinct values of one column in code order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoricalSchema {
    pub items: Vec<CategoryItem>,
}

impl CategoricalSchema {
    fn from_names(names: Vec<String>) -> Self {
        let items = names
            .into_iter()
            .enumerate()
            .map(|(code, name)| CategoryItem {
                color: color_of(&name),
                code: code as u32,
                name,
            })
            .collect();
        CategoricalSchema { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A factorized column
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedAnnotation {
    pub key: String,
    pub schema: CategoricalSchema,
    pub width: CodeWidth,
    pub buffer: Vec<u8>,
}

/// Categorical configuration handed to the front end
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnnotationConfig {
    pub id: String,
    pub available_anno_types: Vec<String>,
    pub default_anno_type: String,
    pub anno_maps: BTreeMap<String, CategoricalSchema>,
    pub anno_dtypes: BTreeMap<String, CodeWidth>,
}

/// Config plus one code buffer per key
#[derive(Clone, Debug, PartialEq)]
pub struct CategoricalBundle {
    pub config: AnnotationConfig,
    pub buffers: BTreeMap<String, Vec<u8>>,
}

impl CategoricalBundle {
    pub fn total_bytes(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }
}

/// `f64` ordered by [f64::total_cmp]
#[derive(Clone, Copy, Debug)]
struct TotalF64(f64);

impl PartialEq for TotalF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TotalF64 {}

impl PartialOrd for TotalF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for TotalF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn factorize_sorted<T: Ord + fmt::Display>(values: &[T]) -> (Vec<String>, Vec<u32>) {
    let distinct: BTreeSet<&T> = values.iter().collect();
    let lookup: BTreeMap<&T, u32> = distinct
        .iter()
        .enumerate()
        .map(|(code, &value)| (value, code as u32))
        .collect();
    let codes = values.iter().map(|v| lookup[v]).collect();
    let names = distinct.into_iter().map(ToString::to_string).collect();
    (names, codes)
}

/// Distinct value names in code order and the code of every value
pub fn factorize(column: &Column) -> (Vec<String>, Vec<u32>) {
    match column {
        Column::Text(v) => factorize_sorted(v),
        Column::Int(v) => factorize_sorted(v),
        Column::Bool(v) => factorize_sorted(v),
        Column::Float(v) => {
            let wrapped: Vec<TotalF64> = v.iter().copied().map(TotalF64).collect();
            factorize_sorted(&wrapped)
        }
    }
}

/// Factorizes the column `key` of `source`
pub fn encode_annotation(
    source: &dyn DataSource,
    key: &str,
    observer: &dyn ExportObserver,
) -> crate::Result<EncodedAnnotation> {
    let start = Instant::now();
    let column = source
        .column(key)
        .ok_or_else(|| crate::Error::missing(AttributeKind::Annotation, key))?;
    crate::Error::check_len(key, source.n_obs(), column.len())?;
    if column.is_empty() {
        log::warn!("annotation '{}' is empty", key);
    }

    let (names, codes) = factorize(column);
    let width = CodeWidth::for_category_count(names.len());
    let buffer = width.pack(&codes);
    log::debug!(
        "annotation '{}': categories={} dtype={}",
        key,
        names.len(),
        width
    );

    observer.report(&StageReport {
        stage: Stage::Annotation,
        key,
        bytes: buffer.len(),
        elapsed: start.elapsed(),
    });

    Ok(EncodedAnnotation {
        key: key.to_string(),
        schema: CategoricalSchema::from_names(names),
        width,
        buffer,
    })
}

/// `primary` followed by `extra` without duplicates, first occurrence wins
pub fn annotation_keys(primary: &str, extra: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(primary)
        .chain(extra.iter().map(String::as_str))
        .filter(|key| seen.insert(*key))
        .map(String::from)
        .collect()
}

/// Encodes `primary` and `extra` into one bundle.
///
/// Stops at the first missing attribute, nothing is returned for the keys
/// encoded before it.
pub fn encode_annotations(
    source: &dyn DataSource,
    primary: &str,
    extra: &[String],
    id: String,
    observer: &dyn ExportObserver,
) -> crate::Result<CategoricalBundle> {
    let start = Instant::now();
    let keys = annotation_keys(primary, extra);

    let mut anno_maps = BTreeMap::new();
    let mut anno_dtypes = BTreeMap::new();
    let mut buffers = BTreeMap::new();
    for key in &keys {
        let encoded = encode_annotation(source, key, observer)?;
        anno_maps.insert(encoded.key.clone(), encoded.schema);
        anno_dtypes.insert(encoded.key.clone(), encoded.width);
        buffers.insert(encoded.key, encoded.buffer);
    }

    let bundle = CategoricalBundle {
        config: AnnotationConfig {
            id,
            available_anno_types: keys,
            default_anno_type: primary.to_string(),
            anno_maps,
            anno_dtypes,
        },
        buffers,
    };
    observer.report(&StageReport {
        stage: Stage::AnnotationBatch,
        key: &bundle.config.available_anno_types.join(","),
        bytes: bundle.total_bytes(),
        elapsed: start.elapsed(),
    });
    Ok(bundle)
}
