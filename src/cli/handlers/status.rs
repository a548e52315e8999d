// src/cli/handlers/status.rs

use anyhow::Result;
use colored::Colorize;

use crate::cli::handlers::commons;

pub fn handle() -> Result<()> {
    let set = commons::load_package_set()?;
    println!("managed directory: {}", set.directory.display());

    for (name, package) in &set.packages {
        println!();
        println!("{} ({})", name.bold(), package.definition);
        if !package.directory.is_dir() {
            println!("  not fetched");
            continue;
        }
        if let Some(branch) = package.current_branch() {
            println!("  branch: {branch}");
        }
        if package.builds.is_empty() {
            println!("  no recorded builds");
            continue;
        }
        for build in &package.builds {
            let when = build
                .last_update()
                .map_or_else(String::new, |t| format!(" ({})", t.format("%Y-%m-%d %H:%M")));
            println!("  {}: {}{when}", build.name, build.current_status());
        }
    }
    Ok(())
}
