//! Config command handlers: show effective configuration.

use std::path::Path;

use anyhow::Result;
use comicdl_core::Settings;
use comicdl_core::config::resolve_default_config_path;
use serde::Serialize;

use super::print_json;

#[derive(Serialize)]
struct ConfigReport<'a> {
    config_path: Option<String>,
    config_file: &'static str,
    settings: &'a Settings,
}

pub fn run_config_show_command(explicit_path: Option<&Path>, settings: &Settings) -> Result<()> {
    let path = explicit_path
        .map(Path::to_path_buf)
        .or_else(resolve_default_config_path);
    let loaded = path.as_deref().is_some_and(Path::exists);

    print_json(&ConfigReport {
        config_path: path.map(|p| p.display().to_string()),
        config_file: if loaded {
            "loaded"
        } else {
            "not found (using defaults)"
        },
        settings,
    })
}
