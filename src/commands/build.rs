use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::cli::BuildArgs;
use crate::commands::inventory;
use crate::extract::assemble::CollectionAssembler;
use crate::extract::backends::{
    CommandVisionExtractor, PdftotextLayout, PdftotextRaw, VisionExtractor, command_available,
    probe_page_count,
};
use crate::extract::orchestrate::{
    Collaborators, DocumentInput, Orchestrator, OrchestratorConfig, Outcome,
};
use crate::model::BuildRunManifest;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: BuildArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    info!(
        input_root = %args.input_root.display(),
        output = %args.output.display(),
        run_id = %run_id,
        "starting build"
    );

    // The only fatal failure mode: total inability to enumerate documents.
    let manifest = inventory::build_manifest(&args.input_root)?;

    let inventory_manifest_path = args
        .inventory_manifest_path
        .clone()
        .unwrap_or_else(|| args.output.with_file_name("document_inventory.json"));
    write_json_pretty(&inventory_manifest_path, &manifest)?;

    let mut warnings = Vec::<String>::new();
    if !command_available("pdftotext") {
        let message =
            "pdftotext is unavailable; layout and raw tiers will fail per document".to_string();
        warn!("{message}");
        warnings.push(message);
    }

    let vision: Option<Arc<dyn VisionExtractor>> = match args.vision_command.clone() {
        Some(program) => Some(Arc::new(CommandVisionExtractor { program })),
        None => {
            info!("no vision command configured; vision tier unavailable");
            None
        }
    };

    let collaborators = Collaborators {
        layout: Arc::new(PdftotextLayout),
        vision,
        raw: Arc::new(PdftotextRaw),
    };

    let orchestrator = Orchestrator::new(OrchestratorConfig {
        vision_timeout: Duration::from_secs(args.vision_timeout_secs),
        ..OrchestratorConfig::default()
    })?;

    let assembler = Mutex::new(CollectionAssembler::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.max(1))
        .build()
        .context("failed to build worker pool")?;

    pool.install(|| {
        manifest.documents.par_iter().for_each(|document| {
            let input = DocumentInput {
                document_id: document.filename.clone(),
                path: args.input_root.join(&document.filename),
                total_pages: probe_page_count(&args.input_root.join(&document.filename)),
                sample_pages: args.sample_pages,
            };

            let outcome = orchestrator.extract(&input, &collaborators);

            let mut guard = match assembler.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match outcome {
                Outcome::Committed(record) => {
                    info!(
                        document = %record.document_id,
                        method = record.parse_method.as_str(),
                        entries = record.entries.len(),
                        confidence = record.confidence,
                        low_confidence = record.low_confidence,
                        "committed document"
                    );
                    guard.add(record, &document.group);
                }
                Outcome::Skipped {
                    document_id,
                    reason,
                } => {
                    warn!(document = %document_id, reason = %reason, "skipped document");
                    guard.record_skip(&document_id, &reason);
                }
            }
        });
    });

    let collection = assembler
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .finalize();

    write_json_pretty(&args.output, &collection)?;
    info!(path = %args.output.display(), "wrote collection");

    let updated_at = now_utc_string();
    let run_manifest = BuildRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at,
        command: render_build_command(&args),
        counts: collection.stats.clone(),
        warnings,
        notes: vec![
            "Skipped documents are reported in counts, not treated as failures.".to_string(),
        ],
    };

    let run_manifest_path = args.run_manifest_path.clone().unwrap_or_else(|| {
        args.output
            .with_file_name(format!("build_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&run_manifest_path, &run_manifest)?;

    info!(
        path = %run_manifest_path.display(),
        processed = collection.stats.documents_processed,
        skipped = collection.stats.documents_skipped,
        "build completed"
    );

    Ok(())
}

fn render_build_command(args: &BuildArgs) -> String {
    let mut command = format!(
        "tocbuild build --input-root {} --output {} --jobs {} --sample-pages {}",
        args.input_root.display(),
        args.output.display(),
        args.jobs,
        args.sample_pages
    );
    if let Some(program) = &args.vision_command {
        command.push_str(&format!(
            " --vision-command {} --vision-timeout-secs {}",
            program, args.vision_timeout_secs
        ));
    }
    command
}
