// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Loading and saving the files the CLI works on.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use threadloom_context::{AgentConfig, ContextResult, GlobalConfig, UserProfile};
use threadloom_core::ConversationSession;

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Parse a config file as JSON or TOML depending on its extension.
fn load_config<T>(
    path: &Path,
    from_json: fn(&str) -> ContextResult<T>,
    from_toml: fn(&str) -> ContextResult<T>,
) -> Result<T> {
    let input = read(path)?;
    let parsed = if is_json(path) {
        from_json(&input)
    } else {
        from_toml(&input)
    };
    parsed.with_context(|| format!("Invalid configuration in {}", path.display()))
}

pub fn load_agent(path: &Path) -> Result<AgentConfig> {
    load_config(path, AgentConfig::from_json_str, AgentConfig::from_toml_str)
}

pub fn load_global(path: &Path) -> Result<GlobalConfig> {
    load_config(path, GlobalConfig::from_json_str, GlobalConfig::from_toml_str)
}

pub fn load_user(path: &Path) -> Result<UserProfile> {
    load_config(path, UserProfile::from_json_str, UserProfile::from_toml_str)
}

pub fn load_session(path: &Path) -> Result<ConversationSession> {
    let input = read(path)?;
    ConversationSession::from_json_str(&input)
        .with_context(|| format!("Invalid session file {}", path.display()))
}

/// Write the session next to `path` and atomically replace it.
pub fn save_session(path: &Path, session: &ConversationSession) -> Result<()> {
    let json = session.to_json_string()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(json.as_bytes())?;
    file.flush()?;
    file.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
