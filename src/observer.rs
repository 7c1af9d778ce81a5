//! Timing and byte-count reporting.
//!
//! Encoders report every finished step to an [ExportObserver]. The default
//! [LogObserver] forwards the reports to the `log` facade.

use std::fmt;
use std::time::Duration;

/// Encoding step a report belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    PointCloud,
    Annotation,
    AnnotationBatch,
    ContinuousObs,
    ContinuousGene,
    ContinuousBatch,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PointCloud => "point_cloud",
            Stage::Annotation => "annotation",
            Stage::AnnotationBatch => "annotation_batch",
            Stage::ContinuousObs => "continuous_obs",
            Stage::ContinuousGene => "continuous_gene",
            Stage::ContinuousBatch => "continuous_batch",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// One finished step
#[derive(Clone, Debug, PartialEq)]
pub struct StageReport<'a> {
    pub stage: Stage,
    /// Attribute key, batch summary or file path
    pub key: &'a str,
    /// Bytes produced by the step
    pub bytes: usize,
    pub elapsed: Duration,
}

/// Receives [StageReport]s, may be shared between threads
pub trait ExportObserver: Send + Sync {
    fn report(&self, report: &StageReport<'_>);
}

/// Logs every report at info level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl ExportObserver for LogObserver {
    fn report(&self, report: &StageReport<'_>) {
        log::info!(
            "{}: key={} bytes={} took {:.3}s",
            report.stage,
            report.key,
            report.bytes,
            report.elapsed.as_secs_f64()
        );
    }
}

/// Drops every report
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ExportObserver for NoopObserver {
    fn report(&self, _report: &StageReport<'_>) {}
}
