//! Mount command - serve a host directory as a volume.

use fsbridge_core::{Backend, Capabilities, Config, DirFs};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Run the mount command.
pub fn run(
    config: Config,
    source: &Path,
    mount_point: &str,
    writable: bool,
    label: Option<String>,
) -> anyhow::Result<()> {
    let backend = DirFs::new(source)?.writable(writable);
    let root = backend.root().display().to_string();
    let capabilities = Capabilities::of(&backend);

    let mut options = config.mount_options();
    if let Some(label) = label {
        options = options.with_label(label);
    }

    fsbridge_dokan::set_driver_flags(config.driver);
    let backend: Arc<dyn Backend> = Arc::new(backend);
    let mount = fsbridge_dokan::mount(mount_point, backend, options)?;

    println!("Mounted {} on {} ({})", root, mount.mount_point(), capabilities);
    println!("Press Enter to unmount.");

    // Returns on Enter or when stdin closes
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    info!(
        mount_point = %mount.mount_point(),
        open_files = mount.opened_file_count(),
        "Unmounting"
    );
    mount.close()?;
    println!("Unmounted {}", mount.mount_point());

    Ok(())
}
