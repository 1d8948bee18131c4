use indicatif::{
    ParallelProgressIterator,
    ProgressStyle,
};
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{
    Path,
    PathBuf,
};
use std::time::Instant;

use mzalign::io::read_scan_store_json;
use mzalign::pipeline::{
    SampleStatus,
    SampleSummary,
};
use mzalign::targeted::{
    search,
    Target,
};
use mzalign::{
    BatchOutput,
    InputError,
    Pipeline,
    PipelineParams,
    ScanStore,
};
use tracing::{
    info,
    instrument,
    warn,
};

use crate::cli::{
    RunArgs,
    WriteTemplateArgs,
};
use crate::error::CliError;

/// Main function for the 'run' subcommand.
#[instrument(skip_all)]
pub fn main_run(args: RunArgs) -> Result<(), CliError> {
    let mut params: PipelineParams = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => PipelineParams::default(),
    };
    if args.threads.is_some() {
        params.threads = args.threads;
    }
    info!("Using parameters: {:#?}", params);
    let pipeline = Pipeline::new(params)?;

    let targets: Option<Vec<Target>> = match &args.targets {
        Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let (stores, unreadable) = load_inputs(&args.inputs);
    if stores.is_empty() {
        return Err(CliError::DataReading(format!(
            "None of the {} inputs could be read",
            args.inputs.len()
        )));
    }

    let start = Instant::now();
    let mut output = pipeline.run(stores)?;
    info!("Batch processed in {:?}", start.elapsed());
    for (path, err) in unreadable {
        output.summary.samples.push(SampleSummary {
            sample_id: path.display().to_string(),
            status: SampleStatus::Failed,
            num_scans: 0,
            num_rois: 0,
            num_peaks: 0,
            num_features: 0,
            error: Some(err.to_string()),
        });
    }

    std::fs::create_dir_all(&args.output_dir)?;
    write_outputs(&output, &args.output_dir, args.sample_reports)?;

    if let Some(targets) = targets {
        let hits = search(
            &output.table.features,
            &targets,
            &pipeline.params().alignment.tolerance,
        );
        let path = args.output_dir.join("target_hits.csv");
        let mut wtr = csv::Writer::from_writer(BufWriter::new(File::create(&path)?));
        for hit in hits.iter() {
            wtr.serialize(hit)?;
        }
        wtr.flush()?;
        let found = hits.iter().filter(|h| h.feature_id.is_some()).count();
        info!("Found {} of {} targets, wrote {}", found, hits.len(), path.display());
    }

    println!(
        "Wrote {} aligned features across {} samples to {}",
        output.table.len(),
        output.table.sample_ids.len(),
        args.output_dir.display()
    );
    Ok(())
}

/// Reads every input in parallel. Files that fail to load are returned
/// separately so the rest of the batch can go ahead.
fn load_inputs(paths: &[PathBuf]) -> (Vec<ScanStore>, Vec<(PathBuf, InputError)>) {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let results: Vec<(PathBuf, Result<ScanStore, InputError>)> = paths
        .par_iter()
        .progress_with_style(style)
        .map(|path| (path.clone(), read_scan_store_json(path)))
        .collect();

    let mut stores = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for (path, result) in results {
        match result {
            Ok(store) => stores.push(store),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                failed.push((path, e));
            }
        }
    }
    info!("Loaded {} of {} samples", stores.len(), paths.len());
    (stores, failed)
}

fn write_outputs(output: &BatchOutput, dir: &Path, sample_reports: bool) -> Result<(), CliError> {
    let table_csv = dir.join("feature_table.csv");
    output
        .table
        .write_csv(BufWriter::new(File::create(&table_csv)?))?;

    let table_json = dir.join("feature_table.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&table_json)?), &output.table)?;

    let summary_json = dir.join("batch_summary.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&summary_json)?), &output.summary)?;
    info!(
        "Wrote {}, {} and {}",
        table_csv.display(),
        table_json.display(),
        summary_json.display()
    );

    if sample_reports {
        let reports_dir = dir.join("samples");
        std::fs::create_dir_all(&reports_dir)?;
        for (sample_id, features) in output.table.sample_ids.iter().zip(output.sample_features.iter()) {
            let path = reports_dir.join(format!("{sample_id}_features.csv"));
            mzalign::feature_table::write_sample_report(features, BufWriter::new(File::create(&path)?))?;
        }
        info!("Wrote {} sample reports to {}", output.table.sample_ids.len(), reports_dir.display());
    }
    Ok(())
}

const TARGETS_TEMPLATE: &str = r#"[
    { "name": "caffeine", "mz": 195.0877, "rt_seconds": 312.5 },
    { "name": "tryptophan", "mz": 205.0972 }
]"#;

/// Main function for the 'write-template' subcommand.
pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    let target_dir = args.output_path;
    std::fs::create_dir_all(&target_dir)?;

    let config_path = target_dir.join("config_template.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&PipelineParams::default())?,
    )?;
    println!("Wrote configuration template to: {}", config_path.display());

    let targets_path = target_dir.join("targets_template.json");
    std::fs::write(&targets_path, TARGETS_TEMPLATE)?;
    println!("Wrote targets template to: {}", targets_path.display());
    Ok(())
}
