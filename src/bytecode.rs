//! Bytecode extractor: pulls a compiled contract's bytecode out of a
//! `combined_solc.json` artifact and stages it as a standalone file for the
//! engine's `load()`.

use std::path::{Path, PathBuf};

use crate::error::GenericError;
use rand::Rng;

const TMP_CONTRACT_DIR: &str = "/tmp/";

/// Failure reasons specific to bytecode extraction.
#[derive(thiserror::Error, Debug)]
pub enum BytecodeError {
    #[error("no contract name given and {0} contracts present: {1:?}")]
    AmbiguousContract(usize, Vec<String>),

    #[error("no contract named `{0}` in the compiler artifact")]
    ContractNotFound(String),

    #[error("malformed compiler artifact: missing `contracts` object")]
    MalformedArtifact,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Read `{crytic_dir}/combined_solc.json`, select `contract_name` (or the
/// sole contract if `None` and exactly one exists), and write its `bin`
/// bytecode to a freshly named file under `tmp_dir`. Returns that file's
/// path.
pub fn extract_contract_bytecode(
    crytic_dir: &Path,
    contract_name: Option<&str>,
    tmp_dir: Option<&Path>,
) -> Result<PathBuf, BytecodeError> {
    let artifact_path = crytic_dir.join("combined_solc.json");
    let bytes = std::fs::read(&artifact_path)?;
    let artifact: serde_json::Value = serde_json::from_slice(&bytes)?;

    let contracts = artifact["contracts"].as_object().ok_or(BytecodeError::MalformedArtifact)?;

    let bytecode = match contract_name {
        Some(name) => {
            let entry = contracts
                .iter()
                .find(|(path, _)| path.as_str() == name || path.ends_with(&format!(":{name}")));
            match entry {
                Some((_, data)) => data["bin"].as_str().unwrap_or("").to_string(),
                None => return Err(BytecodeError::ContractNotFound(name.to_string())),
            }
        }
        None => {
            if contracts.len() != 1 {
                let names: Vec<String> = contracts.keys().cloned().collect();
                return Err(BytecodeError::AmbiguousContract(contracts.len(), names));
            }
            let (_, data) = contracts.iter().next().expect("checked len == 1 above");
            data["bin"].as_str().unwrap_or("").to_string()
        }
    };

    let dir = tmp_dir.unwrap_or_else(|| Path::new(TMP_CONTRACT_DIR));
    let unique_signature: u32 = rand::thread_rng().gen();
    let output_path = dir.join(format!("optik_contract_{unique_signature:x}.sol"));
    std::fs::write(&output_path, bytecode)?;
    Ok(output_path)
}

impl From<BytecodeError> for GenericError {
    fn from(e: BytecodeError) -> Self {
        match e {
            BytecodeError::Io(io) => GenericError::Io(io),
            BytecodeError::Json(json) => GenericError::Json(json),
            other => GenericError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_artifact(dir: &Path, contracts: &serde_json::Value) {
        let artifact = serde_json::json!({ "contracts": contracts });
        std::fs::write(dir.join("combined_solc.json"), serde_json::to_vec(&artifact).unwrap()).unwrap();
    }

    #[test]
    fn selects_sole_contract_when_unnamed() {
        let dir = std::env::temp_dir().join(format!("optik_test_{:x}", rand::thread_rng().gen::<u32>()));
        std::fs::create_dir_all(&dir).unwrap();
        write_artifact(&dir, &serde_json::json!({ "a.sol:A": { "bin": "6001" } }));

        let out = extract_contract_bytecode(&dir, None, Some(&dir)).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "6001");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn ambiguous_without_a_name() {
        let dir = std::env::temp_dir().join(format!("optik_test_{:x}", rand::thread_rng().gen::<u32>()));
        std::fs::create_dir_all(&dir).unwrap();
        write_artifact(
            &dir,
            &serde_json::json!({ "a.sol:A": { "bin": "6001" }, "b.sol:B": { "bin": "6002" } }),
        );

        let err = extract_contract_bytecode(&dir, None, Some(&dir)).unwrap_err();
        assert!(matches!(err, BytecodeError::AmbiguousContract(2, _)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn selects_by_name() {
        let dir = std::env::temp_dir().join(format!("optik_test_{:x}", rand::thread_rng().gen::<u32>()));
        std::fs::create_dir_all(&dir).unwrap();
        write_artifact(
            &dir,
            &serde_json::json!({ "a.sol:A": { "bin": "6001" }, "b.sol:B": { "bin": "6002" } }),
        );

        let out = extract_contract_bytecode(&dir, Some("B"), Some(&dir)).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "6002");

        std::fs::remove_dir_all(&dir).ok();
    }
}
