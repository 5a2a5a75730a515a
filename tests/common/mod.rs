//! Shared test infrastructure for integration tests.

use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Temporary directory holding a schema, a world snapshot, and run outputs.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.path(name);
        let text = serde_json::to_string_pretty(value).expect("serialize fixture");
        fs::write(&path, text).expect("write fixture");
        path
    }

    pub fn read_json(&self, name: &str) -> Value {
        let text = fs::read_to_string(self.path(name)).expect("read output");
        serde_json::from_str(&text).expect("parse output")
    }

    /// Run sbuild with `args`, keeping logs quiet unless something goes wrong.
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_sbuild"))
            .current_dir(self.dir.path())
            .env("RUST_LOG", "warn")
            .args(args)
            .output()
            .expect("run sbuild")
    }
}

/// Two fire stations: one a truck and a trailer short with spare crew, one
/// without any crew at all.
pub fn world() -> Value {
    json!({
        "facilities": [
            {
                "id": "f1", "name": "North", "location_id": "42", "category": "JRG",
                "level": 3, "crew_size": 12, "free_space": 2,
                "vehicles": [{"id": "v1", "class": "Truck"}],
                "crew": [
                    {"id": "c1", "qualifications": [], "assigned_to": "v1", "state": "available"},
                    {"id": "c2", "qualifications": [], "state": "available"},
                    {"id": "c3", "qualifications": ["HAZMAT"], "state": "available"}
                ],
                "expansion_slots": [
                    {"id": "s1", "kind": "rsd", "status": "to_build"},
                    {"id": "s2", "kind": "wrd", "status": "waiting_other"}
                ]
            },
            {
                "id": "f2", "name": "South", "location_id": "42", "category": "JRG",
                "level": 1, "crew_size": 40, "free_space": 0
            },
            {
                "id": "p1", "name": "Precinct", "location_id": "42", "category": "OPI",
                "level": 1, "crew_size": 5, "free_space": 4
            }
        ]
    })
}

pub fn schema() -> Value {
    json!({
        "schema_version": 1,
        "vehicles": {
            "Truck": {"count": 2, "crew": 1},
            "Hose trailer": {"count": 1, "category": "trailer"}
        },
        "expansions": {"JRG": {"rsd": true}}
    })
}
