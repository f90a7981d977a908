//! Validate job files.

use std::path::PathBuf;

use syncplot_data_model::GroupPattern;

pub fn run(configs: Vec<PathBuf>) -> anyhow::Result<()> {
    for path in &configs {
        println!("Reading job file: {}", path.display());
    }
    let config = super::load_job(&configs)?;

    println!("  Video: {} ({})", config.video.path().display(), config.video.kind());
    println!("  Output: {}", config.render.target_file_path.display());
    println!("  Sensors: {}", config.sensors.len());
    for (i, sensor) in config.sensors.iter().enumerate() {
        let groups = match &sensor.graph_groups {
            Some(patterns) => describe_patterns(patterns),
            None => "one axis per column".to_string(),
        };
        println!(
            "    {} [{}] {} ({groups})",
            config.sensor_name(i),
            sensor.sync.kind(),
            sensor.path.display()
        );
    }

    let missing = config.missing_files();
    if missing.is_empty() {
        println!("  Inputs: All present");
        println!("\nJob is valid.");
    } else {
        println!("\nValidation issues:");
        for path in &missing {
            println!("  - missing input: {}", path.display());
        }
        println!("\n{} issue(s) found. Rendering will fail.", missing.len());
    }

    Ok(())
}

fn describe_patterns(patterns: &[GroupPattern]) -> String {
    patterns
        .iter()
        .map(GroupPattern::label)
        .collect::<Vec<_>>()
        .join(" | ")
}
