pub mod check;
pub mod offsets;
pub mod render;
pub mod validate;

use std::path::PathBuf;

use syncplot_data_model::JobConfig;

pub(crate) fn load_job(configs: &[PathBuf]) -> anyhow::Result<JobConfig> {
    JobConfig::from_files(configs).map_err(|e| anyhow::anyhow!("Failed to load job config: {e}"))
}
