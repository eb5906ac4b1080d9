use std::path::Path;
use warden_core::config::Config;
use warden_core::io::{ensure_dir, ensure_gitignore_entry, write_if_missing};
use warden_core::paths;

/// Scaffold `.warden/` in the project: a commented default config plus
/// gitignore entries for the runtime files (state, lock, signing secret).
pub fn run(root: &Path) -> anyhow::Result<()> {
    ensure_dir(&paths::warden_dir(root))?;

    let config_yaml = format!(
        "# warden configuration. Delete any section to fall back to defaults.\n{}",
        serde_yaml::to_string(&Config::default())?
    );
    let written = write_if_missing(&paths::config_path(root), config_yaml.as_bytes())?;

    for entry in [
        paths::STATE_FILE,
        ".warden/state.json.lock",
        paths::SECRET_FILE,
    ] {
        ensure_gitignore_entry(root, entry)?;
    }

    if written {
        println!("Initialized warden in {}", paths::warden_dir(root).display());
    } else {
        println!(
            "warden already initialized in {} (config left untouched)",
            paths::warden_dir(root).display()
        );
    }
    println!("Wire the hooks to: warden hook <event>");
    Ok(())
}
