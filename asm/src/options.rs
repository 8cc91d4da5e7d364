use crate::error::Error;
use arch::model::Model;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AssemblerOptions {
    /// Names seeded into the `#define` set
    pub predefined_symbols: Vec<String>,
    pub current_model: Option<Model>,
    pub max_loop_errors_to_report: usize,
    pub proc_explicit_locals_only: bool,
    pub max_loop_iterations: i64,
    /// Nesting limit of macro expansions
    pub max_macro_depth: usize,
    pub default_start_address: u16,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        AssemblerOptions {
            predefined_symbols: Vec::new(),
            current_model: None,
            max_loop_errors_to_report: 16,
            proc_explicit_locals_only: false,
            max_loop_iterations: 0xFFFF,
            max_macro_depth: 32,
            default_start_address: 0x8000,
        }
    }
}

impl AssemblerOptions {
    pub fn from_yaml_file(path: &str) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| Error::FileOpen(path.to_string(), e.to_string()))?;
        serde_yaml::from_reader(BufReader::new(file))
            .map_err(|e| Error::Config(path.to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn yaml() {
        let options: AssemblerOptions = serde_yaml::from_str(
            "predefined-symbols: [DEBUG]\ncurrent-model: NEXT\nmax-loop-iterations: 10\n",
        )
        .unwrap();
        assert_eq!(options.predefined_symbols, vec!["DEBUG".to_string()]);
        assert_eq!(options.current_model, Some(Model::NEXT));
        assert_eq!(options.max_loop_iterations, 10);
        assert_eq!(options.max_macro_depth, 32);
        assert_eq!(options.max_loop_errors_to_report, 16);
        assert_eq!(options.default_start_address, 0x8000);
    }
}
