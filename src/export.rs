//! Export orchestration.
//!
//! [export] runs the point cloud, categorical and continuous encoders over
//! one [DataSource] and collects their output in an [ExportBundle]. Any
//! encoder error aborts the export and is returned as is.

use crate::categorical::{encode_annotations, AnnotationConfig, CategoricalBundle};
use crate::continuous::{
    encode_continuous, ContinuousBundle, ContinuousDescriptor, DEFAULT_GENE_PREFIX,
};
use crate::error::AttributeKind;
use crate::observer::ExportObserver;
use crate::source::DataSource;
use crate::writer::{encode_point_cloud, Dimensionality, PointCloudBuffer, PointCloudOptions};

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn default_gene_prefix() -> String {
    DEFAULT_GENE_PREFIX.to_string()
}

/// What to export, usually deserialized from JSON
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Key of the coordinate matrix
    pub position_key: String,
    #[serde(default)]
    pub mode: Dimensionality,
    /// Primary categorical attribute, always exported first
    pub region_key: String,
    /// Additional categorical attributes
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Numeric obs columns
    #[serde(default)]
    pub continuous_obs: Vec<String>,
    #[serde(default)]
    pub genes: Vec<String>,
    /// Expression layer, the default matrix when absent
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default = "default_gene_prefix")]
    pub gene_prefix: String,
    /// Write LAZ instead of LAS
    #[serde(default)]
    pub compress: bool,
}

impl ExportRequest {
    pub fn new(position_key: impl Into<String>, region_key: impl Into<String>) -> Self {
        ExportRequest {
            position_key: position_key.into(),
            mode: Dimensionality::default(),
            region_key: region_key.into(),
            annotations: Vec::new(),
            continuous_obs: Vec::new(),
            genes: Vec::new(),
            layer: None,
            gene_prefix: default_gene_prefix(),
            compress: false,
        }
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Everything one export call produces
#[derive(Clone, Debug, PartialEq)]
pub struct ExportBundle {
    pub point_cloud: PointCloudBuffer,
    pub annotations: CategoricalBundle,
    pub continuous: ContinuousBundle,
}

impl ExportBundle {
    pub fn annotation_config(&self) -> &AnnotationConfig {
        &self.annotations.config
    }

    pub fn continuous_config(&self) -> &BTreeMap<String, ContinuousDescriptor> {
        &self.continuous.descriptors
    }

    pub fn annotation_config_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.annotations.config)?)
    }

    pub fn continuous_config_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.continuous.descriptors)?)
    }

    pub fn total_bytes(&self) -> usize {
        self.point_cloud.bytes.len()
            + self.annotations.total_bytes()
            + self.continuous.total_bytes()
    }
}

/// Fresh random identifier in RFC 4122 version 4 layout
pub fn new_bundle_id() -> String {
    let mut bits = fastrand::u128(..);
    bits = (bits & !(0xf_u128 << 76)) | (0x4_u128 << 76);
    bits = (bits & !(0xc_u128 << 60)) | (0x8_u128 << 60);
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        bits >> 96,
        (bits >> 80) & 0xffff,
        (bits >> 64) & 0xffff,
        (bits >> 48) & 0xffff,
        bits & 0xffff_ffff_ffff
    )
}

/// Runs every encoder of `request` over `source`
pub fn export(
    source: &dyn DataSource,
    request: &ExportRequest,
    observer: &dyn ExportObserver,
) -> crate::Result<ExportBundle> {
    log::info!(
        "export: position_key={} region_key={} annotations={:?} continuous_obs={:?} genes={} n_obs={}",
        request.position_key,
        request.region_key,
        request.annotations,
        request.continuous_obs,
        request.genes.len(),
        source.n_obs()
    );

    let position_key = request.position_key.as_str();
    let coords = source
        .coordinates(position_key)
        .ok_or_else(|| crate::Error::missing(AttributeKind::Coordinates, position_key))?;
    crate::Error::check_len(position_key, source.n_obs(), coords.n_rows())?;
    let point_cloud = encode_point_cloud(
        coords,
        request.mode,
        &PointCloudOptions {
            compress: request.compress,
        },
        observer,
    )?;

    let annotations = encode_annotations(
        source,
        &request.region_key,
        &request.annotations,
        new_bundle_id(),
        observer,
    )?;

    let continuous = encode_continuous(
        source,
        &request.continuous_obs,
        &request.genes,
        request.layer.as_deref(),
        &request.gene_prefix,
        observer,
    )?;

    let bundle = ExportBundle {
        point_cloud,
        annotations,
        continuous,
    };
    log::info!("export: finished total_bytes={}", bundle.total_bytes());
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn bundle_ids_look_like_uuid_v4() {
        let ids: HashSet<String> = (0..256).map(|_| new_bundle_id()).collect();
        assert_eq!(ids.len(), 256);
        for id in &ids {
            let groups: Vec<_> = id.split('-').map(str::len).collect();
            assert_eq!(groups, [8, 4, 4, 4, 12]);
            assert_eq!(&id[14..15], "4");
            assert!(matches!(&id[19..20], "8" | "9" | "a" | "b"));
        }
    }

    #[test]
    fn request_defaults() {
        let request =
            ExportRequest::from_json(r#"{"position_key": "spatial", "region_key": "region"}"#)
                .unwrap();
        assert_eq!(request, ExportRequest::new("spatial", "region"));
        assert_eq!(request.mode, Dimensionality::ThreeD);
        assert_eq!(request.gene_prefix, "Gene");
    }

    #[test]
    fn request_from_json() {
        let request = ExportRequest::from_json(
            r#"{
                "position_key": "spatial",
                "mode": "2D",
                "region_key": "region",
                "annotations": ["layer"],
                "genes": ["Actb"],
                "layer": "counts",
                "compress": true
            }"#,
        )
        .unwrap();
        assert_eq!(request.mode, Dimensionality::TwoD);
        assert_eq!(request.annotations, ["layer"]);
        assert_eq!(request.layer.as_deref(), Some("counts"));
        assert!(request.compress);
    }

    #[test]
    fn bad_request_json() {
        assert!(matches!(
            ExportRequest::from_json(r#"{"position_key": "spatial"}"#),
            Err(crate::Error::Json(_))
        ));
    }
}
