//! The counting pipeline.

use crate::{
    aggregate::{self, SkippedRecord, Tally},
    common::*,
    config::{CountConfig, PartitionKind},
    error::CountError,
    manifest::ClassManifest,
    scan::scan_partition,
    store::ObjectStore,
    summary::SummaryRecord,
    ObjectLocation,
};

/// The outcome of a counting run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Where the summary is published.
    pub output: ObjectLocation,
    pub summary: SummaryRecord,
    pub partitions: Vec<PartitionReport>,
    /// Records left out under the skip policy, sorted by location and line.
    pub skipped: Vec<SkippedRecord>,
}

/// Per-partition statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub kind: PartitionKind,
    pub prefix: String,
    pub files: usize,
    pub records: u64,
}

/// Count annotations and publish the summary.
///
/// The optional deadline bounds the counting phase. Publishing starts only
/// after counting finished, and nothing is published if any step fails.
pub async fn run(store: &dyn ObjectStore, config: &CountConfig) -> Result<RunReport, CountError> {
    let counting = count(store, config);
    let report = match config.processing.deadline() {
        Some(deadline) => tokio::time::timeout(deadline, counting)
            .await
            .map_err(|_| CountError::DeadlineExceeded(deadline))??,
        None => counting.await?,
    };

    report.summary.publish(store, &report.output).await?;
    Ok(report)
}

/// Count annotations over the train, validation and test partitions
/// without publishing anything.
pub async fn count(
    store: &dyn ObjectStore,
    config: &CountConfig,
) -> Result<RunReport, CountError> {
    config.validate()?;
    let CountConfig {
        dataset,
        output,
        processing,
    } = config;

    let manifest = ClassManifest::load(store, &dataset.manifest_location()).await?;

    let mut total = Tally::default();
    let mut partitions = vec![];

    for descriptor in dataset.partitions.descriptors() {
        let locations = scan_partition(
            store,
            &dataset.bucket,
            &descriptor.prefix,
            &dataset.annotation_suffix,
        );
        let tally = aggregate::aggregate(
            store,
            &manifest,
            locations,
            processing.record_policy,
            processing.concurrency,
        )
        .instrument(info_span!("partition", name = %descriptor.kind))
        .await?;

        info!(
            "{} partition: {} records in {} files",
            descriptor.kind, tally.records, tally.files
        );
        partitions.push(PartitionReport {
            kind: descriptor.kind,
            prefix: descriptor.prefix,
            files: tally.files,
            records: tally.records,
        });
        total.merge(tally);
    }

    let Tally {
        counts,
        mut skipped,
        ..
    } = total;
    skipped.sort();
    if !skipped.is_empty() {
        warn!("{} malformed records were skipped", skipped.len());
    }

    Ok(RunReport {
        output: output.location(),
        summary: SummaryRecord::new(&manifest, counts),
        partitions,
        skipped,
    })
}
