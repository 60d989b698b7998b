//! Mounts command - list volumes the driver has mounted.

use crate::OutputFormat;
use fsbridge_core::Config;

/// Run the mounts command.
pub fn run(_config: Config, output: OutputFormat) -> anyhow::Result<()> {
    let mounts = fsbridge_dokan::mount_points()?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&mounts)?);
        }
        OutputFormat::Text => {
            if mounts.is_empty() {
                println!("No volumes mounted.");
                return Ok(());
            }

            println!("{:<24} {:<40} {:>8}", "MOUNT POINT", "DEVICE", "OPTIONS");
            for m in &mounts {
                println!(
                    "{:<24} {:<40} {:>#8x}",
                    m.mount_point, m.device_name, m.options
                );
                if !m.unc_name.is_empty() {
                    println!("    UNC: {}", m.unc_name);
                }
            }
        }
    }

    Ok(())
}
