//! Persistence of the result namespace as a single JSON container.

use std::fs;
use std::path::Path;

use jc_core::Result;

use crate::tree::ResultTree;

/// Output sink for a finalized [`ResultTree`].
pub trait ResultWriter {
    /// Persist the tree at `path`.
    fn write(&self, path: &Path, tree: &ResultTree) -> Result<()>;
}

/// JSON container writer.
///
/// One document holding the full four-level namespace; every result carries
/// its name, axis labels, bin edges, contents, and errors, so a read-back
/// reproduces the tree exactly.
#[derive(Debug, Clone, Default)]
pub struct JsonWriter {
    /// Pretty-print the container.
    pub pretty: bool,
}

impl ResultWriter for JsonWriter {
    fn write(&self, path: &Path, tree: &ResultTree) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = if self.pretty {
            serde_json::to_vec_pretty(tree)?
        } else {
            serde_json::to_vec(tree)?
        };
        fs::write(path, payload)?;
        tracing::info!(path = %path.display(), results = tree.len(), "wrote result tree");
        Ok(())
    }
}

/// Read a previously-written container back.
pub fn read_result_tree(path: &Path) -> Result<ResultTree> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Conventional output file name, stamping the globally-reduced run range
/// when one exists.
pub fn output_file_name(run_range: Option<(u32, u32)>, run_tag: &str) -> String {
    match run_range {
        Some((lo, hi)) => format!("JCHists_runs{lo}to{hi}_{run_tag}.json"),
        None => format!("JCHists_{run_tag}.json"),
    }
}
