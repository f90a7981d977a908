//! Print the offset computed for every sensor stream.

use std::path::PathBuf;

use syncplot_render_engine::compute_offsets;

pub fn run(configs: Vec<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = super::load_job(&configs)?;
    let offsets =
        compute_offsets(&config).map_err(|e| anyhow::anyhow!("Synchronization failed: {e}"))?;

    tracing::debug!(streams = offsets.len(), "Offsets computed");

    if json {
        println!("{}", serde_json::to_string_pretty(&offsets)?);
        return Ok(());
    }

    println!("{:<24} {:<20} {:>12}", "STREAM", "SYNC", "OFFSET (s)");
    for offset in &offsets {
        println!(
            "{:<24} {:<20} {:>12.4}",
            offset.stream, offset.kind, offset.offset_secs
        );
        if let Some(report) = &offset.report {
            println!(
                "{:<24} rates {} Hz -> {} Hz, peak {:.3} at lag {}",
                "",
                report.reference_rate,
                report.target_rate,
                report.peak.value,
                report.peak.lag
            );
        }
    }
    Ok(())
}
