use anyhow::{Result, anyhow};
use std::{env, path::PathBuf};

/// Well-known locations used by the `lbmirror` binary.
#[derive(Clone, Debug)]
pub struct Paths {
    pub home: PathBuf,
    pub config: PathBuf,
}

/// Resolve the lbmirror configuration directory.
///
/// `$XDG_CONFIG_HOME/lbmirror` when set, otherwise `$HOME/.config/lbmirror`.
pub fn lbmirror_home() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("lbmirror"));
    }
    let home = env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("neither XDG_CONFIG_HOME nor HOME is set"))?;
    Ok(PathBuf::from(home).join(".config").join("lbmirror"))
}

pub fn paths() -> Result<Paths> {
    let home = lbmirror_home()?;
    Ok(Paths {
        config: home.join("config.toml"),
        home,
    })
}
