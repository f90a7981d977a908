//! Render the composite video of a job.

use std::io::Write;
use std::path::PathBuf;

use syncplot_common::ToolsConfig;
use syncplot_render_engine::{render_composite, RenderJob, RenderProgress, RenderStage};

pub async fn run(
    configs: Vec<PathBuf>,
    output: Option<PathBuf>,
    tools: ToolsConfig,
) -> anyhow::Result<()> {
    let config = super::load_job(&configs)?;
    let job = RenderJob {
        config,
        tools,
        output_path: output,
    };

    println!("Rendering {} sensor(s)", job.config.sensors.len());
    println!("  Video: {}", job.config.video.path().display());
    println!("  Output: {}", job.output_path().display());
    println!(
        "  Layout: {:?}, {} column(s), {} fps, {}",
        job.config.render.stacking_direction,
        job.config.render.plot_column_count,
        job.config.render.output_fps,
        job.config.render.fourcc_codec.fourcc()
    );

    let progress_cb: Box<dyn Fn(RenderProgress) + Send> = Box::new(|p| match p.stage {
        RenderStage::Rendering => {
            print!(
                "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                p.progress * 100.0,
                p.frames_rendered,
                p.total_frames,
                p.eta_secs,
            );
            std::io::stdout().flush().ok();
        }
        RenderStage::Synchronizing => println!("  Synchronizing streams..."),
        _ => {}
    });

    let output_path = render_composite(job, Some(progress_cb))
        .await
        .map_err(|e| anyhow::anyhow!("\nRender failed: {e}"))?;
    tracing::info!(output = %output_path.display(), "Render finished");
    println!("\nRender complete: {}", output_path.display());
    Ok(())
}
