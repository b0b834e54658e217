// download.rs - Model file download with SHA256 bookkeeping.
//
// Downloads model files from the Hugging Face hub on first use and caches them
// locally at ~/.sentence-embed/models/all-MiniLM-L12-v2/.
// Hashes are recorded in manifest.json on download and re-checked on every load,
// so a truncated or modified cache is caught before the model is built from it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config;

/// Hashes of the files fetched into a model directory.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelManifest {
    pub model: String,
    pub files: BTreeMap<String, String>,
}

/// Returns the local model directory path (~/.sentence-embed/models/all-MiniLM-L12-v2/).
pub fn model_dir() -> anyhow::Result<PathBuf> {
    let home = crate::logging::home_dir()
        .context("cannot determine home directory (neither HOME nor USERPROFILE is set)")?;
    Ok(home.join(config::embedding::MODEL_DIR_REL))
}

/// Check if all required model files exist in `dir`.
pub fn model_files_exist(dir: &Path) -> bool {
    config::embedding::MODEL_FILES.iter().all(|f| dir.join(f).exists())
}

/// Download all model files into the default cache if not already there.
/// Returns the model directory path.
pub fn ensure_model_files() -> anyhow::Result<PathBuf> {
    let dir = model_dir()?;
    ensure_model_files_in(&dir)?;
    Ok(dir)
}

/// Download any missing model file into `dir` and record its hash.
pub fn ensure_model_files_in(dir: &Path) -> anyhow::Result<()> {
    if model_files_exist(dir) {
        log::info!("Model files already cached at {}", dir.display());
        return Ok(());
    }

    log::info!("Downloading {} to {}", config::embedding::MODEL_NAME, dir.display());
    fs::create_dir_all(dir).with_context(|| format!("failed to create model dir {}", dir.display()))?;

    let mut manifest = read_manifest(dir)?.unwrap_or_default();
    manifest.model = config::embedding::MODEL_NAME.to_string();

    // Files left by an interrupted download were validated before their rename.
    if record_existing_files(dir, &mut manifest)? > 0 {
        write_manifest(dir, &manifest)?;
    }

    let base = config::embedding::MODEL_BASE_URL;
    for name in config::embedding::MODEL_FILES {
        let dest = dir.join(name);
        if dest.exists() {
            continue;
        }
        let hash = download_file(&format!("{base}/{name}"), &dest)?;
        manifest.files.insert(name.to_string(), hash);
        write_manifest(dir, &manifest)?;
    }

    log::info!("Model download complete");
    Ok(())
}

/// Hash model files already present in `dir` that the manifest has no entry for.
/// Returns how many entries were added.
fn record_existing_files(dir: &Path, manifest: &mut ModelManifest) -> anyhow::Result<usize> {
    let mut added = 0;
    for name in config::embedding::MODEL_FILES {
        let path = dir.join(name);
        if !path.exists() || manifest.files.contains_key(name) {
            continue;
        }
        let hash = sha256_file(&path)?;
        log::info!("Recorded existing {} (SHA256: {})", name, hash);
        manifest.files.insert(name.to_string(), hash);
        added += 1;
    }
    Ok(added)
}

/// Re-hash every file listed in the manifest and compare.
///
/// A directory without a manifest was populated by hand; it is accepted as-is.
pub fn verify_model_files(dir: &Path) -> anyhow::Result<()> {
    let Some(manifest) = read_manifest(dir)? else {
        log::warn!("No {} in {}, skipping hash verification", config::download::MANIFEST_FILE_NAME, dir.display());
        return Ok(());
    };

    for (name, expected) in &manifest.files {
        let actual = sha256_file(&dir.join(name))?;
        if &actual != expected {
            bail!("SHA256 mismatch for {}: expected {}, got {}", name, expected, actual);
        }
        log::debug!("SHA256 verified for {} ({})", name, &actual[..12]);
    }
    Ok(())
}

/// Hex SHA256 of a file, streamed.
pub fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).with_context(|| format!("read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Download a file from URL, validate it, and write it atomically. Returns its SHA256.
fn download_file(url: &str, dest: &Path) -> anyhow::Result<String> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy().to_string();
    log::info!("Downloading {} from {}", filename, url);

    let resp = ureq::get(url)
        .timeout(std::time::Duration::from_secs(config::download::DOWNLOAD_TIMEOUT_SECS))
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let status = resp.status();
    if status != 200 {
        bail!("HTTP {status} downloading {url}");
    }

    // Read body into memory (weights are ~130 MB, fits in RAM)
    let mut body = Vec::new();
    resp.into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("failed to read response body for {url}"))?;

    validate_body(&filename, &body)?;

    let mut hasher = Sha256::new();
    hasher.update(&body);
    let hash = hex::encode(hasher.finalize());
    log::info!("Downloaded {} ({} bytes, sha256 {})", filename, body.len(), &hash[..12]);

    write_atomic(dest, &body)?;
    Ok(hash)
}

/// Reject bodies that are obviously not what we asked for (HTML error pages, truncation).
fn validate_body(filename: &str, body: &[u8]) -> anyhow::Result<()> {
    if body.is_empty() {
        bail!("empty response body for {filename}");
    }
    if filename.ends_with(".safetensors") {
        let tensors = safetensors::SafeTensors::deserialize(body)
            .map_err(|e| anyhow::anyhow!("{filename} is not a valid safetensors file: {e:?}"))?;
        if tensors.is_empty() {
            bail!("{filename} contains no tensors");
        }
        log::info!("{} holds {} tensors", filename, tensors.len());
    } else if filename.ends_with(".json") {
        serde_json::from_slice::<serde_json::Value>(body)
            .with_context(|| format!("{filename} is not valid JSON"))?;
    }
    Ok(())
}

// Write to .tmp, then rename
fn write_atomic(dest: &Path, body: &[u8]) -> anyhow::Result<()> {
    let tmp_path = dest.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(body)?;
    file.flush()?;
    drop(file);

    fs::rename(&tmp_path, dest)
        .with_context(|| format!("failed to rename {} -> {}", tmp_path.display(), dest.display()))?;
    Ok(())
}

fn read_manifest(dir: &Path) -> anyhow::Result<Option<ModelManifest>> {
    let path = dir.join(config::download::MANIFEST_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let manifest = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(manifest))
}

fn write_manifest(dir: &Path, manifest: &ModelManifest) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(manifest).context("serialize model manifest")?;
    write_atomic(&dir.join(config::download::MANIFEST_FILE_NAME), &body)
}
