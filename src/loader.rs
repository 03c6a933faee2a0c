use std::fs;
use std::path::Path;

use crate::error::GraphError;
use crate::framework::Subgraph;

/// Load a framework subgraph fixture from a `.json` file.
pub fn load_subgraph_from_path(path: impl AsRef<Path>) -> Result<Subgraph, GraphError> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref).map_err(|err| GraphError::io(path_ref, err))?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_the_path() {
        let err = load_subgraph_from_path("does/not/exist.json").unwrap_err();
        assert!(matches!(err, GraphError::Io { .. }));
        assert!(err.to_string().contains("does/not/exist.json"));
    }

    #[test]
    fn loads_a_fixture() {
        let path = std::env::temp_dir().join(format!("hal-bridge-loader-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"{
                "ops": [{ "type": "tanh", "inputs": { "X": ["a"] }, "outputs": { "Out": ["b"] } }],
                "scope": { "a": { "dims": [2] }, "b": { "dims": [2] } }
            }"#,
        )
        .unwrap();
        let subgraph = load_subgraph_from_path(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(subgraph.ops.len(), 1);
        assert!(subgraph.scope.find_tensor("b").is_some());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let path = std::env::temp_dir().join(format!("hal-bridge-bad-{}.json", std::process::id()));
        fs::write(&path, "{ \"ops\": [").unwrap();
        let err = load_subgraph_from_path(&path).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(matches!(err, GraphError::Parse { .. }));
    }
}
