use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::InventoryArgs;
use crate::model::{DocumentEntry, DocumentInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.input_root)?;

    if args.dry_run {
        info!(
            document_count = manifest.document_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.input_root.join("document_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(document_count = manifest.document_count, "inventory completed");

    Ok(())
}

/// Enumerates PDF documents under the input root. A document's group is the
/// immediate subdirectory it sits in; documents directly under the root go
/// to "ungrouped".
pub fn build_manifest(input_root: &Path) -> Result<DocumentInventoryManifest> {
    let mut paths = Vec::new();
    discover_documents(input_root, &mut paths)?;
    paths.sort();

    if paths.is_empty() {
        bail!("no documents found in {}", input_root.display());
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let relative = path
            .strip_prefix(input_root)
            .with_context(|| format!("path escapes input root: {}", path.display()))?;

        let filename = relative
            .to_str()
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

        let group = relative
            .components()
            .next()
            .filter(|_| relative.components().count() > 1)
            .and_then(|component| component.as_os_str().to_str())
            .unwrap_or("ungrouped")
            .to_string();

        let sha256 = sha256_file(&path)?;

        documents.push(DocumentEntry {
            filename,
            group,
            sha256,
        });
    }

    documents.sort_by(|a, b| a.group.cmp(&b.group).then(a.filename.cmp(&b.filename)));

    Ok(DocumentInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: input_root.display().to_string(),
        document_count: documents.len(),
        documents,
    })
}

fn discover_documents(directory: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(directory)
        .with_context(|| format!("failed to read {}", directory.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", directory.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?;

        if file_type.is_dir() {
            discover_documents(&path, found)?;
            continue;
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if file_type.is_file() && is_pdf {
            found.push(path);
        }
    }

    Ok(())
}
