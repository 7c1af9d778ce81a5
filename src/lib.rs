//! Encoding core for spatial dataset exports.
//!
//! One export turns a [DataSource] into an [ExportBundle]:
//!
//! - a quantized LAS (or LAZ) point cloud of the cell coordinates,
//! - one integer code buffer per categorical attribute plus a schema with
//!   a stable color per category,
//! - one `float32`/`float16` buffer per continuous attribute plus its range.
//!
//! ```no_run
//! use vista_export::{export, CoordinateMatrix, ExportRequest, InMemoryDataset, LogObserver};
//!
//! let dataset = InMemoryDataset::new(2)
//!     .with_coordinates("spatial", CoordinateMatrix::from_rows(&[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]))
//!     .with_column("region", vec!["cortex", "striatum"]);
//! let bundle = export(&dataset, &ExportRequest::new("spatial", "region"), &LogObserver)?;
//! println!("{}", bundle.annotation_config_json()?);
//! # Ok::<(), vista_export::Error>(())
//! ```

mod bounds;
pub mod categorical;
mod color;
pub mod continuous;
mod error;
pub mod export;
mod observer;
mod persist;
mod reader;
pub mod source;
mod writer;

pub use categorical::{
    encode_annotation, encode_annotations, AnnotationConfig, CategoricalBundle,
    CategoricalSchema, CategoryItem, CodeWidth, EncodedAnnotation, ORDERING_POLICY,
};
pub use color::{color_of, COLOR_DIGEST};
pub use continuous::{
    encode_continuous, encode_gene, encode_obs, ContinuousBundle, ContinuousDescriptor,
    ContinuousSource, EncodedContinuous, FloatDtype, DEFAULT_GENE_PREFIX,
};
pub use error::{AttributeKind, Error, Result};
pub use export::{export, new_bundle_id, ExportBundle, ExportRequest};
pub use observer::{ExportObserver, LogObserver, NoopObserver, Stage, StageReport};
pub use persist::{write_bin, Manifest, MANIFEST_FILE};
pub use reader::{decode_point_cloud, DecodedPointCloud};
pub use source::{Column, CoordinateMatrix, DataSource, ExpressionMatrix, InMemoryDataset};
pub use writer::{
    encode_point_cloud, Dimensionality, PointCloudBuffer, PointCloudOptions, QuantizationHeader,
    MIN_SCALE, TARGET_INT_RANGE,
};
