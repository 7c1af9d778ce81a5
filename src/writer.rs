//! LAS point cloud writer.
//!
//! Coordinates are quantized into a LAS 1.2 / point format 3 buffer. The
//! per-axis scale is chosen from the data span so that no axis needs more than
//! [TARGET_INT_RANGE] integer steps, but never finer than [MIN_SCALE].

use crate::bounds::Bounds;
use crate::observer::{ExportObserver, Stage, StageReport};
use crate::source::CoordinateMatrix;

use las::point::Format;
use las::{Builder, Color, Point, Transform, Vector, Version, Writer};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::io::Cursor;
use std::time::Instant;

/// Integer steps available per axis before a coordinate would saturate
pub const TARGET_INT_RANGE: f64 = 1e7;
/// Finest scale ever chosen
pub const MIN_SCALE: f64 = 1e-3;
/// LAS version of the produced buffers
pub const LAS_VERSION: (u8, u8) = (1, 2);
/// Point data record format (xyz, gps time, rgb)
pub const POINT_FORMAT: u8 = 3;

const GENERATING_SOFTWARE: &str = concat!("vista-export ", env!("CARGO_PKG_VERSION"));

/// Output dimensionality of the point cloud
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimensionality {
    /// Flat layout, z is always 0
    #[serde(rename = "2D")]
    TwoD,
    #[default]
    #[serde(rename = "3D")]
    ThreeD,
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimensionality::TwoD => f.write_str("2D"),
            Dimensionality::ThreeD => f.write_str("3D"),
        }
    }
}

/// Offset and scale of the quantized coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantizationHeader {
    /// Per-axis minimum, z is 0 in 2D mode
    pub offset: [f64; 3],
    /// Size of one integer step per axis
    pub scale: [f64; 3],
    /// LAS (major, minor) version
    pub version: (u8, u8),
    /// Uncompressed point data record format id
    pub point_format: u8,
    pub point_count: u64,
}

impl QuantizationHeader {
    /// Derives offset and scale from the extent of the points
    pub fn from_bounds(bounds: &Bounds, mode: Dimensionality, point_count: u64) -> Self {
        let mut offset = bounds.origin();
        let mut scale = bounds.span().map(|s| (s / TARGET_INT_RANGE).max(MIN_SCALE));
        if mode == Dimensionality::TwoD {
            offset[2] = 0.0;
            scale[2] = 1.0;
        }
        QuantizationHeader {
            offset,
            scale,
            version: LAS_VERSION,
            point_format: POINT_FORMAT,
            point_count,
        }
    }

    pub fn transforms(&self) -> Vector<Transform> {
        Vector {
            x: Transform {
                scale: self.scale[0],
                offset: self.offset[0],
            },
            y: Transform {
                scale: self.scale[1],
                offset: self.offset[1],
            },
            z: Transform {
                scale: self.scale[2],
                offset: self.offset[2],
            },
        }
    }

    /// Coordinates of a quantized point
    pub fn dequantize(&self, q: [i32; 3]) -> [f64; 3] {
        [
            self.offset[0] + f64::from(q[0]) * self.scale[0],
            self.offset[1] + f64::from(q[1]) * self.scale[1],
            self.offset[2] + f64::from(q[2]) * self.scale[2],
        ]
    }
}

/// Point cloud writer settings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointCloudOptions {
    /// Write LAZ instead of LAS
    #[serde(default)]
    pub compress: bool,
}

/// An encoded point cloud
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloudBuffer {
    pub header: QuantizationHeader,
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

impl PointCloudBuffer {
    /// Conventional file extension for the buffer
    pub fn extension(&self) -> &'static str {
        if self.compressed {
            "laz"
        } else {
            "las"
        }
    }
}

/// Encodes `coords` as a LAS point cloud.
///
/// A 2-column matrix gets a synthetic z of 0 in either mode. In
/// [Dimensionality::TwoD] mode the z column of a 3-column matrix is dropped
/// and every record is written with z = 0.
pub fn encode_point_cloud(
    coords: &CoordinateMatrix,
    mode: Dimensionality,
    options: &PointCloudOptions,
    observer: &dyn ExportObserver,
) -> crate::Result<PointCloudBuffer> {
    let start = Instant::now();

    match coords.n_cols() {
        2 | 3 => (),
        columns => return Err(crate::Error::Shape { columns, mode }),
    }

    let mut bounds = Bounds::default();
    for (row, values) in coords.rows().enumerate() {
        let xyz = promote(values, mode);
        if let Some(axis) = xyz.iter().position(|v| !v.is_finite()) {
            return Err(crate::Error::NonFiniteCoordinate { row, axis });
        }
        bounds.expand_xyz(xyz);
    }

    let header = QuantizationHeader::from_bounds(&bounds, mode, coords.n_rows() as u64);
    log::debug!(
        "point cloud: n={} mode={} offset={:?} scale={:?}",
        coords.n_rows(),
        mode,
        header.offset,
        header.scale
    );

    let bytes = write_las(
        &header,
        coords.rows().map(|values| promote(values, mode)),
        options.compress,
    )?;

    observer.report(&StageReport {
        stage: Stage::PointCloud,
        key: "points",
        bytes: bytes.len(),
        elapsed: start.elapsed(),
    });

    Ok(PointCloudBuffer {
        header,
        bytes,
        compressed: options.compress,
    })
}

#[inline]
fn promote(values: &[f64], mode: Dimensionality) -> [f64; 3] {
    match (values, mode) {
        ([x, y, z], Dimensionality::ThreeD) => [*x, *y, *z],
        _ => [values[0], values[1], 0.0],
    }
}

fn write_las<I: Iterator<Item = [f64; 3]>>(
    header: &QuantizationHeader,
    points: I,
    compress: bool,
) -> crate::Result<Vec<u8>> {
    let mut builder = Builder::default();
    builder.version = Version::new(header.version.0, header.version.1);
    let mut format = Format::new(header.point_format)?;
    format.is_compressed = compress;
    builder.point_format = format;
    builder.transforms = header.transforms();
    builder.generating_software = GENERATING_SOFTWARE.to_string();

    let mut writer = Writer::new(Cursor::new(Vec::new()), builder.into_header()?)?;
    for [x, y, z] in points {
        writer.write_point(Point {
            x,
            y,
            z,
            gps_time: Some(0.0),
            color: Some(Color::new(0, 0, 0)),
            ..Default::default()
        })?;
    }
    Ok(writer.into_inner()?.into_inner())
}
