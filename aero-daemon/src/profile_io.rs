//! Profile loading glue
//!
//! The engine consumes profiles by value and never touches the disk;
//! this module owns finding and parsing the JSON file
//! (`{schema, name, description, fanCurves, controls, hwmons}`).
//! A missing file is not an error - the daemon then runs in pure
//! monitoring mode.

use std::path::PathBuf;
use tracing::info;

use aero_core::constants::paths;
use aero_core::{validate_profile, Profile};
use aero_error::Result;

/// `AEROD_PROFILE` override, else /etc/aerod/profile.json
pub fn default_profile_path() -> PathBuf {
    std::env::var_os("AEROD_PROFILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(paths::CONFIG_DIR).join(paths::PROFILE_FILE))
}

/// Load and validate the profile, `Ok(None)` when none exists
pub fn load_default_profile() -> Result<Option<Profile>> {
    let path = default_profile_path();
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)?;
    let profile: Profile = serde_json::from_str(&content)?;
    validate_profile(&profile)?;

    info!(
        path = ?path,
        profile = %profile.name,
        curves = profile.fan_curves.len(),
        controls = profile.controls.len(),
        "profile loaded"
    );
    Ok(Some(profile))
}
