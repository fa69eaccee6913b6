//! The generate/check pipeline.

use crate::config::DbConfig;
use crate::discover;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use pgbind_core::codegen::{CodeGenerator, GeneratedFile, QueryGroup};
use pgbind_core::error::CoreError;
use pgbind_core::model::UntypedQuery;
use pgbind_core::{parse_query_file, TypeScriptGenerator};
use pgbind_pg::{Introspector, PgConnection, PgError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What to do with the rendered artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Replace the destination directory with fresh output.
    Generate,
    /// Write nothing; byte-compare against the existing files.
    Check,
}

/// Run the whole pipeline. Returns the process exit code: per-query
/// introspection failures and check mismatches are counted and reported,
/// everything else is an immediate error.
pub async fn run(mode: Mode, src: &Path, dest: &Path) -> Result<i32> {
    let files = discover::find_sql_files(src)?;
    if files.is_empty() {
        bail!("no .sql files under {}", src.display());
    }

    let mut parsed: Vec<(String, Vec<UntypedQuery>)> = Vec::new();
    let mut stems: HashMap<String, PathBuf> = HashMap::new();
    for path in &files {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let queries = parse_query_file(path, &text)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if let Some(first) = stems.insert(stem.clone(), path.clone()) {
            return Err(CoreError::DuplicateGroup {
                name: stem,
                first,
                second: path.clone(),
            }
            .into());
        }
        parsed.push((stem, queries));
    }

    let config = DbConfig::from_env()?;
    info!(server = %config.redacted(), "connecting");
    let conn = PgConnection::connect(
        &config.host,
        config.port,
        &config.user,
        config.password.as_deref(),
        &config.database,
    )
    .await?;
    let mut introspector = Introspector::new(conn);

    let mut groups = Vec::new();
    let mut failures = 0usize;
    for (stem, queries) in parsed {
        let mut typed = Vec::new();
        for query in &queries {
            match introspector.introspect(query).await {
                Ok(t) => typed.push(t),
                Err(PgError::Query { message, detail }) => {
                    failures += 1;
                    let detail = detail.map(|d| format!(" ({d})")).unwrap_or_default();
                    eprintln!(
                        "{} {}: {}: {message}{detail}",
                        "error:".red().bold(),
                        query.file_path.display(),
                        query.name.bold(),
                    );
                }
                Err(fatal) => return Err(fatal.into()),
            }
        }
        groups.push(QueryGroup {
            name: stem,
            queries: typed,
        });
    }
    introspector.finish().await?;

    let artifacts = TypeScriptGenerator::new().generate(&groups)?;

    let mismatches = match mode {
        Mode::Generate => {
            write_artifacts(dest, &artifacts)?;
            println!(
                "{} {} files written to {}",
                "✓".green().bold(),
                artifacts.len(),
                dest.display()
            );
            0
        }
        Mode::Check => {
            let stale = compare_artifacts(dest, &artifacts);
            for path in &stale {
                eprintln!("{} {} is missing or out of date", "error:".red().bold(), path.display());
            }
            if stale.is_empty() {
                println!("{} {} files up to date", "✓".green().bold(), artifacts.len());
            }
            stale.len()
        }
    };

    if failures > 0 {
        eprintln!(
            "{} {failures} quer{} failed introspection",
            "error:".red().bold(),
            if failures == 1 { "y" } else { "ies" },
        );
    }
    Ok(i32::from(failures > 0 || mismatches > 0))
}

/// Remove and recreate the destination, then write every artifact.
fn write_artifacts(dest: &Path, artifacts: &[GeneratedFile]) -> Result<()> {
    match fs::remove_dir_all(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("cannot clear {}", dest.display()));
        }
    }
    fs::create_dir_all(dest).with_context(|| format!("cannot create {}", dest.display()))?;
    for artifact in artifacts {
        let path = dest.join(&artifact.path);
        fs::write(&path, &artifact.contents)
            .with_context(|| format!("cannot write {}", path.display()))?;
        debug!(path = %path.display(), "wrote artifact");
    }
    Ok(())
}

/// Paths of every artifact whose on-disk copy is missing or differs,
/// byte for byte, from what generation would produce.
fn compare_artifacts(dest: &Path, artifacts: &[GeneratedFile]) -> Vec<PathBuf> {
    artifacts
        .iter()
        .filter(|artifact| {
            let path = dest.join(&artifact.path);
            match fs::read(&path) {
                Ok(existing) => existing != artifact.contents.as_bytes(),
                Err(_) => true,
            }
        })
        .map(|artifact| dest.join(&artifact.path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pgbind-run-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn artifacts() -> Vec<GeneratedFile> {
        vec![
            GeneratedFile {
                path: PathBuf::from("users.ts"),
                contents: "export const a = 1;\n".to_string(),
            },
            GeneratedFile {
                path: PathBuf::from("index.ts"),
                contents: "export * from \"./users\";\n".to_string(),
            },
        ]
    }

    #[test]
    fn check_passes_right_after_generate() {
        let dest = scratch_dir("roundtrip");
        write_artifacts(&dest, &artifacts()).unwrap();
        assert!(compare_artifacts(&dest, &artifacts()).is_empty());
        fs::remove_dir_all(&dest).unwrap();
    }

    #[test]
    fn check_flags_mutated_and_missing_files() {
        let dest = scratch_dir("mutated");
        write_artifacts(&dest, &artifacts()).unwrap();
        fs::write(dest.join("users.ts"), "tampered\n").unwrap();
        fs::remove_file(dest.join("index.ts")).unwrap();

        let stale = compare_artifacts(&dest, &artifacts());
        assert_eq!(stale.len(), 2);
        assert!(stale.iter().any(|p| p.ends_with("users.ts")));
        assert!(stale.iter().any(|p| p.ends_with("index.ts")));
        fs::remove_dir_all(&dest).unwrap();
    }

    #[test]
    fn generate_replaces_stale_destination_contents() {
        let dest = scratch_dir("replace");
        fs::write(dest.join("leftover.ts"), "old artifact").unwrap();
        write_artifacts(&dest, &artifacts()).unwrap();
        assert!(!dest.join("leftover.ts").exists());
        assert!(dest.join("users.ts").exists());
        fs::remove_dir_all(&dest).unwrap();
    }
}
