use webtools_core::{Config, Paths};

pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = super::load_config(&paths)?;

    println!();
    println!("📋 Current Configuration");
    println!("  File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn init(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    init_at(&paths, force)
}

fn init_at(paths: &Paths, force: bool) -> anyhow::Result<()> {
    let path = paths.config_file();
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    paths.ensure_dirs()?;
    Config::default().save(&path)?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());

        init_at(&paths, false).unwrap();
        assert!(paths.config_file().exists());
        assert!(init_at(&paths, false).is_err());
        assert!(init_at(&paths, true).is_ok());

        let loaded = Config::load(&paths.config_file()).unwrap();
        assert_eq!(loaded.server.port, 9000);
    }
}
