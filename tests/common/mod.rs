use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnvironment {
    _temp_dir: TempDir, // Prefixed with _ to indicate it's kept for Drop cleanup
    pub corpus_path: PathBuf,
    pub output_dir: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let corpus_path = temp_dir.path().join("contributions.jsonl");
        let output_dir = temp_dir.path().join("results");
        let config_path = temp_dir.path().join("config.yaml");

        fs::create_dir_all(&output_dir)?;

        Ok(TestEnvironment {
            _temp_dir: temp_dir,
            corpus_path,
            output_dir,
            config_path,
        })
    }

    /// A sibling output directory for tests that run twice.
    #[allow(dead_code)]
    pub fn extra_output_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self._temp_dir.path().join(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

pub fn contribution_row(id: i64, speaker_id: i64, party: &str, date: &str, text: &str) -> Value {
    json!({
        "id": id,
        "speaker_id": speaker_id,
        "party": party,
        "date": date,
        "text": text,
    })
}

/// Two-party corpus spread over January-April 2019: each speaker
/// contributes every sixth day, Conservatives discussing the EU and Labour
/// mixing topical and domestic speech.
pub fn synthetic_corpus() -> Vec<Value> {
    let con_texts = [
        "the european union withdrawal agreement must pass this house today",
        "we will deliver brexit and leave the european union in good order",
        "the backstop arrangements protect trade across the border with ireland",
    ];
    let lab_texts = [
        "the government has failed working families across this country again",
        "our schools and hospitals need investment not another brexit distraction",
        "labour demands a customs union with the european union after brexit",
    ];

    let mut rows = Vec::new();
    let mut id = 0;
    for month in 1..=4 {
        for day in [3, 9, 15, 21, 27] {
            let date = format!("2019-{:02}-{:02} 14:30:00", month, day);
            for speaker in 1..=6 {
                let text = con_texts[(speaker as usize + day) % con_texts.len()];
                rows.push(contribution_row(id, speaker, "Conservative", &date, text));
                id += 1;
            }
            for speaker in 7..=12 {
                let text = lab_texts[(speaker as usize + day) % lab_texts.len()];
                rows.push(contribution_row(id, speaker, "Labour", &date, text));
                id += 1;
            }
        }
    }
    rows
}

pub fn write_corpus(path: &Path, rows: &[Value]) -> Result<()> {
    let mut file = File::create(path)?;
    for row in rows {
        writeln!(file, "{}", serde_json::to_string(row)?)?;
    }
    Ok(())
}

#[allow(dead_code)]
pub fn write_gzipped_corpus(path: &Path, rows: &[Value]) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    for row in rows {
        writeln!(encoder, "{}", serde_json::to_string(row)?)?;
    }
    encoder.finish()?;
    Ok(())
}

/// Writes a config pointing at the environment's corpus and output
/// directory, with `overrides` YAML fragments merged on top.
pub fn write_config(env: &TestEnvironment, overrides: &str) -> Result<()> {
    write_config_at(env, &env.corpus_path, &env.output_dir, overrides)
}

pub fn write_config_at(
    env: &TestEnvironment,
    corpus_path: &Path,
    output_dir: &Path,
    overrides: &str,
) -> Result<()> {
    let mut config: serde_yaml::Mapping = if overrides.trim().is_empty() {
        serde_yaml::Mapping::new()
    } else {
        serde_yaml::from_str(overrides)?
    };
    config.insert(
        serde_yaml::Value::String("corpus".to_string()),
        serde_yaml::Value::String(corpus_path.to_str().unwrap().to_string()),
    );
    config.insert(
        serde_yaml::Value::String("output_dir".to_string()),
        serde_yaml::Value::String(output_dir.to_str().unwrap().to_string()),
    );

    let yaml_content = serde_yaml::to_string(&config)?;
    let mut file = File::create(&env.config_path)?;
    file.write_all(yaml_content.as_bytes())?;
    Ok(())
}

pub fn read_json_file(path: &Path) -> Result<Value> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// All .json reports under a directory, keyed by filename.
pub fn read_report_files(report_dir: &Path) -> Result<Vec<(String, Value)>> {
    let mut reports = Vec::new();
    if report_dir.exists() {
        for entry in fs::read_dir(report_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                let name = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                reports.push((name, read_json_file(&path)?));
            }
        }
    }
    reports.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(reports)
}
