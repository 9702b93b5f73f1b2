use anyhow::{anyhow, bail, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const BUNDLE_FORMAT: &str = "marksd-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

const WORKSPACE_DB: &str = "marksd.sqlite3";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/marksd.sqlite3";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub bytes_written: u64,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

/// Zips the workspace database together with a manifest. The caller must
/// make sure no transaction is open on the database while this runs.
pub fn export_workspace_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = workspace.join(WORKSPACE_DB);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "database": DB_ENTRY,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest).context("failed to encode manifest")?)
        .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    let out_file = zip.finish().context("failed to finalize bundle")?;
    let bytes_written = out_file
        .metadata()
        .map(|m| m.len())
        .context("failed to stat bundle")?;

    tracing::info!(bundle = %out_path.display(), bytes = bytes_written, "workspace exported");
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: 2,
        bytes_written,
    })
}

/// Restores a workspace database from a bundle, or from a bare SQLite file.
/// The database is extracted next to the target first and only renamed into
/// place once fully written.
pub fn import_workspace_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let dst = workspace.join(WORKSPACE_DB);
    let staging = workspace.join(format!("{}.importing", WORKSPACE_DB));
    if staging.exists() {
        std::fs::remove_file(&staging)
            .with_context(|| format!("failed to clear {}", staging.display()))?;
    }

    let detected = match sniff(in_path)? {
        Sniffed::Zip => {
            extract_bundle(in_path, &staging)?;
            BUNDLE_FORMAT
        }
        Sniffed::Sqlite => {
            std::fs::copy(in_path, &staging).with_context(|| {
                format!("failed to copy {} to {}", in_path.display(), staging.display())
            })?;
            RAW_SQLITE_FORMAT
        }
        Sniffed::Unknown => bail!("{} is neither a bundle nor a sqlite file", in_path.display()),
    };

    std::fs::rename(&staging, &dst)
        .with_context(|| format!("failed to move restored database to {}", dst.display()))?;

    tracing::info!(source = %in_path.display(), format = detected, "workspace restored");
    Ok(ImportSummary {
        bundle_format_detected: detected.to_string(),
    })
}

fn extract_bundle(in_path: &Path, staging: &Path) -> anyhow::Result<()> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.display()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut out = File::create(staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;
    let mut entry = archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {}", DB_ENTRY))?;
    std::io::copy(&mut entry, &mut out).context("failed to extract database entry")?;
    out.flush().context("failed to flush extracted database")?;
    Ok(())
}

enum Sniffed {
    Zip,
    Sqlite,
    Unknown,
}

fn sniff(path: &Path) -> anyhow::Result<Sniffed> {
    let mut f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut head = [0u8; 16];
    let mut filled = 0;
    while filled < head.len() {
        let n = f
            .read(&mut head[filled..])
            .context("failed to read file signature")?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled >= 4 && head[..4] == ZIP_MAGIC {
        return Ok(Sniffed::Zip);
    }
    if filled == head.len() && &head == SQLITE_MAGIC {
        return Ok(Sniffed::Sqlite);
    }
    Ok(Sniffed::Unknown)
}
