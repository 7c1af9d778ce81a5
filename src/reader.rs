//! LAS/LAZ point cloud reader.
//!
//! Reads back buffers produced by [crate::encode_point_cloud] through
//! [las::Reader], which handles both the plain and the laszip-compressed
//! layout.

use crate::writer::QuantizationHeader;

use las::Reader;

use std::io::{Cursor, ErrorKind};

/// A decoded point cloud
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedPointCloud {
    pub header: QuantizationHeader,
    pub compressed: bool,
    /// Raw integer coordinates
    pub quantized: Vec<[i32; 3]>,
    /// `offset + quantized * scale`
    pub points: Vec<[f64; 3]>,
}

fn open(bytes: &[u8]) -> crate::Result<Reader> {
    Reader::new(Cursor::new(bytes.to_vec())).map_err(|e| match e {
        las::Error::InvalidFileSignature(_) => {
            crate::Error::NotAPointCloud("missing LASF signature")
        }
        las::Error::Io(ref io) if io.kind() == ErrorKind::UnexpectedEof => {
            crate::Error::NotAPointCloud("truncated header")
        }
        other => other.into(),
    })
}

/// Decodes a LAS or LAZ buffer into quantized and reconstructed coordinates
pub fn decode_point_cloud(bytes: &[u8]) -> crate::Result<DecodedPointCloud> {
    let mut reader = open(bytes)?;

    let las_header = reader.header();
    let transforms = *las_header.transforms();
    let version = las_header.version();
    let format = *las_header.point_format();
    let header = QuantizationHeader {
        offset: [
            transforms.x.offset,
            transforms.y.offset,
            transforms.z.offset,
        ],
        scale: [transforms.x.scale, transforms.y.scale, transforms.z.scale],
        version: (version.major, version.minor),
        point_format: format.to_u8()?,
        point_count: las_header.number_of_points(),
    };
    log::debug!(
        "decoding {} points, format {} compressed={}",
        header.point_count,
        header.point_format,
        format.is_compressed
    );

    let n = header.point_count as usize;
    let mut quantized = Vec::with_capacity(n);
    let mut points = Vec::with_capacity(n);
    for point in reader.points() {
        let raw = point?.into_raw(&transforms)?;
        let xyz = [raw.x, raw.y, raw.z];
        quantized.push(xyz);
        points.push(header.dequantize(xyz));
    }

    Ok(DecodedPointCloud {
        header,
        compressed: format.is_compressed,
        quantized,
        points,
    })
}
