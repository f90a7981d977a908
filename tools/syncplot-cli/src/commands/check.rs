//! Check system capabilities.

use syncplot_common::{config_file_path, AppConfig};
use syncplot_render_engine::ffmpeg::command_exists;

pub fn run(app_config: &AppConfig) -> anyhow::Result<()> {
    println!("SyncPlot System Check");
    println!("{}", "=".repeat(50));

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] App config: {}", config_path.display());
    } else {
        println!("[--] App config: defaults ({} not found)", config_path.display());
    }

    let tools = &app_config.tools;
    let mut all_ok = true;
    for (label, binary) in [("Decoder/encoder", &tools.ffmpeg), ("Prober", &tools.ffprobe)] {
        if command_exists(binary) {
            println!("[OK] {label}: {}", binary.display());
        } else {
            println!("[MISSING] {label}: {}", binary.display());
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All required tools are available. SyncPlot is ready.");
    } else {
        println!("Install ffmpeg or set tools.ffmpeg / tools.ffprobe in the app config.");
    }

    Ok(())
}
