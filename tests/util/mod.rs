use std::fs;
use std::path::{Path, PathBuf};

use papers_explorer::indexer;
use serde_json::{Value, json};

/// Builder for corpus fixtures: accumulates paper records, writes the
/// corpus JSON, and can build the SQLite index in one step.
#[allow(dead_code)]
pub struct CorpusBuilder {
    papers: Vec<Value>,
}

#[allow(dead_code)]
impl CorpusBuilder {
    pub fn new() -> Self {
        Self { papers: Vec::new() }
    }

    pub fn paper(mut self, value: Value) -> Self {
        self.papers.push(value);
        self
    }

    /// Write the corpus file as the expected top-level shape.
    pub fn write(&self, dir: &Path) -> PathBuf {
        let path = dir.join("corpus.json");
        fs::write(&path, json!({"results": self.papers}).to_string()).unwrap();
        path
    }

    /// Write the corpus and build the index at `dir/papers.db`.
    pub fn build(&self, dir: &Path) -> PathBuf {
        let corpus = self.write(dir);
        let db = dir.join("papers.db");
        indexer::build_index(&corpus, &db).expect("index build");
        db
    }
}

/// A small mixed-shape corpus used across the integration suites.
#[allow(dead_code)]
pub fn sample_corpus() -> CorpusBuilder {
    CorpusBuilder::new()
        .paper(json!({
            "id": 1,
            "name": "Beta Networks for Speech",
            "authors": ["Carol Chen", "Dan Davis"],
            "keywords": ["speech", "audio"],
            "decision": "accept (poster)",
            "topic": "speech",
            "year": 2025,
            "visible": true,
        }))
        .paper(json!({
            "id": 2,
            "name": "Alpha Methods in Vision",
            "authors": ["Ada Lovelace"],
            "keywords": ["vision", "CNN"],
            "decision": "accept (oral)",
            "topic": "vision",
            "year": 2025,
            "visible": true,
        }))
        .paper(json!({
            "id": 3,
            "name": "alpha pruning at scale",
            "authors": ["Bob Baker", "Ada Lovelace"],
            "keywords": ["NLP", "pruning"],
            "decision": "reject",
            "topic": "nlp",
            "year": 2024,
            "visible": false,
        }))
        .paper(json!({
            "id": 4,
            "name": "Gamma Transformers",
            "authors": ["Eve Evans"],
            "keywords": ["NLP", "transformers"],
            "decision": "accept (poster)",
            "topic": "nlp",
            "session": "A1",
            "venue": {"room": "Hall B", "day": "Tue"},
            "abstract": null,
        }))
}
