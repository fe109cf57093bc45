// File: src/persistence.rs
use crate::core::context::LatticeContext;
use crate::core::lattice::Lattice;
use crate::core::types::{FrequencyTable, Line};
use crate::error::{LatticeError, Result};
use crate::fuzzy::SuffixRecoveryMap;
use crate::learning::Corrections;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Context document as written: the current schema with its version tag.
#[derive(Serialize)]
struct ContextDocument<'a> {
    schema_version: &'static str,
    lattice: &'a Lattice,
    corrections: Option<&'a Corrections>,
    suffix_map: Option<&'a SuffixRecoveryMap>,
    frequencies: &'a FrequencyTable,
}

/// Version 1 documents carried only the lattice.
#[derive(Deserialize)]
struct ContextV1 {
    lattice: Lattice,
}

const CONTEXT_SCHEMA_VERSION: &str = "2";

/// The binary snapshot layout. Plain struct: bincode cannot carry tags.
#[derive(Clone, Serialize, Deserialize)]
struct SerializableState {
    context: LatticeContext,
}

/// Writes through a temp file in the target directory, then renames.
fn write_atomic(path: &Path, write: impl FnOnce(&mut BufWriter<&NamedTempFile>) -> Result<()>) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(&temp_file);
        write(&mut writer)?;
        writer.flush()?;
    }
    temp_file.persist(path)?;
    debug!(path = %path.display(), "artifact written");
    Ok(())
}

pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    write_atomic(path, |writer| Ok(serde_json::to_writer_pretty(writer, value)?))
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Saves a lattice in its `{ word_to_window, window_contents, num_windows }` form.
pub fn save_lattice(lattice: &Lattice, path: &Path) -> Result<()> {
    save_json(lattice, path)
}

/// Loads a lattice, rejecting any file whose two maps disagree.
pub fn load_lattice(path: &Path) -> Result<Lattice> {
    load_json(path)
}

pub fn save_context(context: &LatticeContext, path: &Path) -> Result<()> {
    let document = ContextDocument {
        schema_version: CONTEXT_SCHEMA_VERSION,
        lattice: &context.lattice,
        corrections: context.corrections.as_ref(),
        suffix_map: context.suffix_map.as_ref(),
        frequencies: &context.frequencies,
    };
    save_json(&document, path)
}

/// Loads a context document of any supported schema version. Corrections
/// and suffix windows are checked against the lattice before returning.
pub fn load_context(path: &Path) -> Result<LatticeContext> {
    let value: serde_json::Value = load_json(path)?;
    let version = match value.get("schema_version") {
        Some(serde_json::Value::String(v)) => v.clone(),
        Some(other) => return Err(LatticeError::UnsupportedSchema(other.to_string())),
        None => return Err(LatticeError::UnsupportedSchema("missing schema_version".into())),
    };
    match version.as_str() {
        "1" => {
            let legacy: ContextV1 = serde_json::from_value(value)?;
            Ok(LatticeContext::new(legacy.lattice))
        }
        "2" => Ok(serde_json::from_value(value)?),
        other => Err(LatticeError::UnsupportedSchema(other.to_string())),
    }
}

pub fn save_snapshot(context: &LatticeContext, path: &Path) -> Result<()> {
    let state = SerializableState { context: context.clone() };
    write_atomic(path, |writer| Ok(bincode::serialize_into(writer, &state)?))
}

pub fn load_snapshot(path: &Path) -> Result<LatticeContext> {
    let reader = BufReader::new(File::open(path)?);
    let state: SerializableState = bincode::deserialize_from(reader)?;
    Ok(state.context)
}

/// Reads a corpus: one line per text line, tokens split on whitespace.
/// Blank lines are skipped.
pub fn load_corpus(path: &Path) -> Result<Vec<Line>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let tokens: Line = line?.split_whitespace().map(str::to_string).collect();
        if !tokens.is_empty() {
            lines.push(tokens);
        }
    }
    Ok(lines)
}

pub fn save_corpus(lines: &[Line], path: &Path) -> Result<()> {
    write_atomic(path, |writer| {
        for line in lines {
            writeln!(writer, "{}", line.join(" "))?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrectionConfig, SuffixConfig};
    use crate::core::lattice::tests::four_window_lattice;
    use crate::learning::{CorrectionTable, OffsetCorrectionLearner};
    use tempfile::tempdir;

    fn corpus() -> Vec<Line> {
        let mut lines: Vec<Line> = (0..10)
            .map(|_| "a c e g".split(' ').map(str::to_string).collect())
            .collect();
        lines.push("a d zzg h".split(' ').map(str::to_string).collect());
        lines
    }

    fn suffix_map(lattice: &Lattice, freq: &FrequencyTable) -> SuffixRecoveryMap {
        let config = SuffixConfig { suffixes: vec!["g".into()], min_count: 1 };
        SuffixRecoveryMap::build(lattice, freq, &config)
    }

    fn trained() -> LatticeContext {
        let lines = corpus();
        let lattice = four_window_lattice();
        let freq = FrequencyTable::from_lines(&lines);
        let table = OffsetCorrectionLearner::new(CorrectionConfig::default())
            .unwrap()
            .learn(&lines, &lattice);
        let suffix_map = suffix_map(&lattice, &freq);
        LatticeContext::new(lattice)
            .with_corrections(Corrections::Uniform(table))
            .with_suffix_map(suffix_map)
            .with_frequencies(freq)
    }

    #[test]
    fn lattice_round_trip_reproduces_admissibility() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lattice.json");
        let lattice = four_window_lattice();
        save_lattice(&lattice, &path).unwrap();
        let loaded = load_lattice(&path).unwrap();
        let lines = corpus();
        assert_eq!(
            LatticeContext::new(loaded).admissibility(&lines),
            LatticeContext::new(lattice).admissibility(&lines)
        );
    }

    #[test]
    fn tampered_lattice_is_rejected_at_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lattice.json");
        let mut artifact = four_window_lattice().to_artifact();
        artifact.word_to_window.insert("a".into(), 2);
        save_json(&artifact, &path).unwrap();
        assert!(load_lattice(&path).is_err());
    }

    #[test]
    fn context_round_trips_through_json_and_bincode() {
        let dir = tempdir().unwrap();
        let ctx = trained();

        let json_path = dir.path().join("ctx.json");
        save_context(&ctx, &json_path).unwrap();
        assert_eq!(load_context(&json_path).unwrap(), ctx);

        let bin_path = dir.path().join("nested").join("ctx.bin");
        save_snapshot(&ctx, &bin_path).unwrap();
        let restored = load_snapshot(&bin_path).unwrap();
        assert_eq!(restored.admissibility(&corpus()), ctx.admissibility(&corpus()));
    }

    #[test]
    fn tiered_context_round_trips() {
        let dir = tempdir().unwrap();
        let lines = corpus();
        let lattice = four_window_lattice();
        let freq = FrequencyTable::from_lines(&lines);
        let config = CorrectionConfig { min_obs: 1, ..CorrectionConfig::default() };
        let tiered = OffsetCorrectionLearner::new(config)
            .unwrap()
            .learn_tiered(&lines, &lattice, &freq);
        let ctx = LatticeContext::new(lattice.clone())
            .with_corrections(Corrections::Tiered(tiered))
            .with_suffix_map(suffix_map(&lattice, &freq))
            .with_frequencies(freq);

        let path = dir.path().join("tiered.json");
        save_context(&ctx, &path).unwrap();
        let loaded = load_context(&path).unwrap();
        assert_eq!(loaded, ctx);
        assert_eq!(loaded.admissibility(&lines), ctx.admissibility(&lines));
    }

    #[test]
    fn context_inconsistent_with_its_lattice_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        save_context(&trained(), &path).unwrap();
        let mut value: serde_json::Value = load_json(&path).unwrap();
        value["suffix_map"]["entries"][0]["window"] = serde_json::json!(9);
        save_json(&value, &path).unwrap();
        assert!(load_context(&path).is_err());

        let mut snapshot = trained();
        snapshot.corrections = Some(Corrections::Uniform(CorrectionTable::zeros(3)));
        let bin_path = dir.path().join("ctx.bin");
        save_snapshot(&snapshot, &bin_path).unwrap();
        assert!(load_snapshot(&bin_path).is_err());
    }

    #[test]
    fn legacy_and_unknown_schemas() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v1.json");
        let legacy = serde_json::json!({
            "schema_version": "1",
            "lattice": four_window_lattice().to_artifact(),
        });
        save_json(&legacy, &path).unwrap();
        let ctx = load_context(&path).unwrap();
        assert!(ctx.corrections.is_none());
        assert_eq!(ctx.lattice, four_window_lattice());

        let future = serde_json::json!({ "schema_version": "9" });
        save_json(&future, &path).unwrap();
        assert!(matches!(load_context(&path), Err(LatticeError::UnsupportedSchema(_))));

        let numeric = serde_json::json!({ "schema_version": 2 });
        save_json(&numeric, &path).unwrap();
        assert!(matches!(load_context(&path), Err(LatticeError::UnsupportedSchema(_))));
    }

    #[test]
    fn corpus_text_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.txt");
        save_corpus(&corpus(), &path).unwrap();
        assert_eq!(load_corpus(&path).unwrap(), corpus());
    }
}
