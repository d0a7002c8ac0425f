//! Layering of YAML configuration files.
//!
//! `.anatprep/config.local.yml` is laid over `.anatprep/config.yml` before
//! the result is deserialized. Mappings combine key by key, a `null` in the
//! upper layer removes the key, and anything else in the upper layer
//! (sequences included) takes the place of what was below it.

use serde_yaml::{Mapping, Value};

/// Lay `upper` over `lower` in place.
pub fn overlay(lower: &mut Value, upper: Value) {
    match (lower, upper) {
        (Value::Mapping(lower), Value::Mapping(upper)) => {
            for (key, value) in upper {
                if value.is_null() {
                    lower.remove(&key);
                } else if let Some(existing) = lower.get_mut(&key) {
                    overlay(existing, value);
                } else {
                    lower.insert(key, value);
                }
            }
        }
        (lower, upper) => *lower = upper,
    }
}

/// Combine config layers, lowest first. Empty files (`null`) are ignored.
pub fn layer_configs(layers: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Value::Mapping(Mapping::new());
    for layer in layers.into_iter().filter(|l| !l.is_null()) {
        overlay(&mut merged, layer);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn upper_layer_wins_at_conflict_point() {
        let base = yaml(
            r#"
settings:
  nprocs: 8
  mem_gb: 16
"#,
        );
        let upper = yaml(
            r#"
settings:
  nprocs: 2
"#,
        );

        let mut result = base;
        overlay(&mut result, upper);

        assert_eq!(result["settings"]["nprocs"], 2);
        assert_eq!(result["settings"]["mem_gb"], 16);
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let base = yaml(
            r#"
run:
  spaces: [MNI152NLin2009cAsym, MNI152NLin6Asym]
"#,
        );
        let upper = yaml(
            r#"
run:
  spaces: [T1w]
"#,
        );

        let mut result = base;
        overlay(&mut result, upper);
        let spaces = result["run"]["spaces"].as_sequence().unwrap();

        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0], "T1w");
    }

    #[test]
    fn null_removes_inherited_value() {
        let base = yaml(
            r#"
tools:
  n4: "N4 --verbose"
  conform: "mri_convert"
"#,
        );
        let upper = yaml(
            r#"
tools:
  n4: null
"#,
        );

        let mut result = base;
        overlay(&mut result, upper);

        assert!(result["tools"].get("n4").is_none());
        assert_eq!(result["tools"]["conform"], "mri_convert");
    }

    #[test]
    fn layers_apply_in_order() {
        let configs = vec![yaml("a: 1\nb: 2"), yaml("b: 3\nc: 4"), yaml("c: 5")];

        let result = layer_configs(configs);

        assert_eq!(result["a"], 1);
        assert_eq!(result["b"], 3);
        assert_eq!(result["c"], 5);
    }

    #[test]
    fn empty_local_file_is_ignored() {
        let configs = vec![yaml("run:\n  recon: none"), yaml("")];

        let result = layer_configs(configs);
        assert_eq!(result["run"]["recon"], "none");
    }

    #[test]
    fn scalar_replaces_mapping_and_back() {
        let mut result = yaml("run:\n  recon: freesurfer");
        overlay(&mut result, yaml("run: disabled"));
        assert_eq!(result["run"], "disabled");

        overlay(&mut result, yaml("run:\n  recon: none"));
        assert_eq!(result["run"]["recon"], "none");
    }

    #[test]
    fn no_layers_give_an_empty_mapping() {
        let result = layer_configs(Vec::new());
        assert!(result.as_mapping().unwrap().is_empty());
    }
}
