//! Submission files: one headerless, fully quoted CSV per task, written
//! into a directory stamped per run so repeated runs never collide.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use csv::{QuoteStyle, Writer, WriterBuilder};
use tracing::info;

use crate::pipeline::Annotations;

/// Creates and returns the directory one run's submissions land in, named
/// for the round, the submission number, and the wall-clock start time.
pub fn submission_dir(base: &Path, round: u32, submission: u32) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let dir = base.join(format!("r{round}_s{submission}_{stamp}"));
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Writes the three task files into `dir`.
pub fn write_submissions(
    dir: &Path,
    round: u32,
    submission: u32,
    annotations: &Annotations,
) -> Result<()> {
    let path = dir.join(format!("arachne_r{round}_s{submission}_cpa.csv"));
    let mut writer = csv_writer(&path)?;
    for annotation in &annotations.properties {
        writer.write_record([
            annotation.table.as_str(),
            &annotation.subject_column.to_string(),
            &annotation.column.to_string(),
            &annotation.predicate,
        ])?;
    }
    finish(writer, &path, annotations.properties.len(), "property")?;

    let path = dir.join(format!("arachne_r{round}_s{submission}_cea.csv"));
    let mut writer = csv_writer(&path)?;
    for annotation in &annotations.entities {
        writer.write_record([
            annotation.table.as_str(),
            &annotation.row.to_string(),
            &annotation.column.to_string(),
            &annotation.entity,
        ])?;
    }
    finish(writer, &path, annotations.entities.len(), "entity")?;

    let path = dir.join(format!("arachne_r{round}_s{submission}_cta.csv"));
    let mut writer = csv_writer(&path)?;
    for annotation in &annotations.types {
        writer.write_record([
            annotation.table.as_str(),
            &annotation.column.to_string(),
            &annotation.class_uri,
        ])?;
    }
    finish(writer, &path, annotations.types.len(), "type")?;

    Ok(())
}

fn csv_writer(path: &Path) -> Result<Writer<fs::File>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))
}

fn finish(mut writer: Writer<fs::File>, path: &Path, count: usize, kind: &str) -> Result<()> {
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {count} {kind} annotations to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{EntityAnnotation, PropertyAnnotation, TypeAnnotation};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("arachne-test-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_submission_dir_name_shape() {
        let base = scratch_dir("dir");
        let dir = submission_dir(&base, 2, 1).unwrap();
        let name = dir.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("r2_s1_"));
        assert!(dir.is_dir());
        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_write_submissions_quotes_every_field() {
        let dir = scratch_dir("write");
        let annotations = Annotations {
            properties: vec![PropertyAnnotation {
                table: "t1".to_string(),
                subject_column: 0,
                column: 1,
                predicate: "http://www.wikidata.org/prop/direct/P17".to_string(),
            }],
            entities: vec![EntityAnnotation {
                table: "t1".to_string(),
                row: 1,
                column: 0,
                entity: "http://www.wikidata.org/entity/Q90".to_string(),
            }],
            types: vec![TypeAnnotation {
                table: "t1".to_string(),
                column: 0,
                class_uri: "http://www.wikidata.org/entity/Q515".to_string(),
            }],
        };
        write_submissions(&dir, 2, 1, &annotations).unwrap();

        let cpa = fs::read_to_string(dir.join("arachne_r2_s1_cpa.csv")).unwrap();
        assert_eq!(
            cpa.trim(),
            "\"t1\",\"0\",\"1\",\"http://www.wikidata.org/prop/direct/P17\""
        );
        let cea = fs::read_to_string(dir.join("arachne_r2_s1_cea.csv")).unwrap();
        assert_eq!(
            cea.trim(),
            "\"t1\",\"1\",\"0\",\"http://www.wikidata.org/entity/Q90\""
        );
        let cta = fs::read_to_string(dir.join("arachne_r2_s1_cta.csv")).unwrap();
        assert_eq!(
            cta.trim(),
            "\"t1\",\"0\",\"http://www.wikidata.org/entity/Q515\""
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_submissions_creates_empty_files() {
        let dir = scratch_dir("empty");
        write_submissions(&dir, 3, 2, &Annotations::default()).unwrap();
        assert!(dir.join("arachne_r3_s2_cpa.csv").exists());
        assert!(dir.join("arachne_r3_s2_cea.csv").exists());
        assert!(dir.join("arachne_r3_s2_cta.csv").exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
