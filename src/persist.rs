//! Writing export artifacts to disk.

use crate::export::ExportBundle;
use crate::observer::{ExportObserver, Stage, StageReport};
use crate::writer::PointCloudBuffer;

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Where [ExportBundle::write_to_dir] put each artifact, relative to the directory
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub point_cloud: String,
    pub annotation_config: String,
    pub continuous_config: String,
    pub annotation_bins: BTreeMap<String, String>,
    pub continuous_bins: BTreeMap<String, String>,
}

/// Writes `bytes` to `path`, creating missing parent directories
pub fn write_bin<P: AsRef<Path>>(
    bytes: &[u8],
    path: P,
    observer: &dyn ExportObserver,
) -> crate::Result<()> {
    let start = Instant::now();
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(bytes)?;
    file.flush()?;

    observer.report(&StageReport {
        stage: Stage::Persist,
        key: &path.display().to_string(),
        bytes: bytes.len(),
        elapsed: start.elapsed(),
    });
    Ok(())
}

impl PointCloudBuffer {
    pub fn write_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        observer: &dyn ExportObserver,
    ) -> crate::Result<()> {
        let path = path.as_ref();
        let expected = self.extension();
        if path.extension().and_then(|e| e.to_str()) != Some(expected) {
            log::warn!("writing {} point cloud to {}", expected, path.display());
        }
        write_bin(&self.bytes, path, observer)
    }
}

/// File name for an attribute key; the index keeps sanitized names unique
fn bin_file_name(index: usize, key: &str) -> String {
    let name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{index:03}_{name}.bin")
}

fn write_bins<'a>(
    dir: &Path,
    sub_dir: &str,
    buffers: impl Iterator<Item = (&'a String, &'a Vec<u8>)>,
    observer: &dyn ExportObserver,
) -> crate::Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for (index, (key, bytes)) in buffers.enumerate() {
        let relative = Path::new(sub_dir).join(bin_file_name(index, key));
        write_bin(bytes, dir.join(&relative), observer)?;
        files.insert(key.clone(), relative.to_string_lossy().into_owned());
    }
    Ok(files)
}

impl ExportBundle {
    /// Writes every artifact below `dir` plus a [Manifest] naming them
    pub fn write_to_dir<P: AsRef<Path>>(
        &self,
        dir: P,
        observer: &dyn ExportObserver,
    ) -> crate::Result<Manifest> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let point_cloud = format!("points.{}", self.point_cloud.extension());
        self.point_cloud.write_to_path(dir.join(&point_cloud), observer)?;

        let annotation_config = "annotation_config.json".to_string();
        write_bin(
            self.annotation_config_json()?.as_bytes(),
            dir.join(&annotation_config),
            observer,
        )?;
        let continuous_config = "continuous_config.json".to_string();
        write_bin(
            self.continuous_config_json()?.as_bytes(),
            dir.join(&continuous_config),
            observer,
        )?;

        let manifest = Manifest {
            point_cloud,
            annotation_config,
            continuous_config,
            annotation_bins: write_bins(
                dir,
                "annotations",
                self.annotations.buffers.iter(),
                observer,
            )?,
            continuous_bins: write_bins(
                dir,
                "continuous",
                self.continuous.buffers.iter(),
                observer,
            )?,
        };
        write_bin(
            serde_json::to_string_pretty(&manifest)?.as_bytes(),
            dir.join(MANIFEST_FILE),
            observer,
        )?;
        Ok(manifest)
    }
}
