//! Check external tools.

use framecast_common::config::AppConfig;
use framecast_render_engine::encoder::command_exists;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Framecast System Check");
    println!("{}", "=".repeat(50));

    let tools = [
        ("Encoder", config.encoder.ffmpeg.as_str(), true),
        ("Probe", config.encoder.ffprobe.as_str(), false),
        ("Renderer", config.renderer.command.as_str(), true),
    ];

    let mut all_required_ok = true;
    for (label, binary, required) in tools {
        if command_exists(binary) {
            println!("[OK] {label}: {binary}");
        } else if required {
            all_required_ok = false;
            println!("[MISSING] {label}: {binary}");
        } else {
            println!("[WARN] {label}: {binary} not found (audio inputs will not be probed)");
        }
    }

    println!();
    if all_required_ok {
        println!("All required tools are available. Framecast is ready.");
    } else {
        println!("Some required tools are missing. See above.");
    }

    Ok(())
}
