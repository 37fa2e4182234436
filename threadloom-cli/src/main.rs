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

//! Threadloom CLI
//!
//! Inspect conversation trees and preview the context that would be sent
//! to a model.

mod files;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use threadloom_context::{ContextPipeline, LogLevel, PipelineContext};
use threadloom_core::{navigator, ContentPart, Direction, HeuristicTokenCalculator, MessageContent};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "threadloom")]
#[command(about = "Threadloom - branching conversation context assembly", long_about = None)]
struct Cli {
    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the context for the session's active branch
    Assemble {
        /// Session file (JSON)
        #[arg(long)]
        session: PathBuf,

        /// Agent configuration (TOML or JSON)
        #[arg(long)]
        agent: PathBuf,

        /// Global configuration (TOML or JSON)
        #[arg(long)]
        global: Option<PathBuf>,

        /// User profile (TOML or JSON)
        #[arg(long)]
        user: Option<PathBuf>,

        /// Also print the pipeline log
        #[arg(long)]
        logs: bool,
    },

    /// Switch a node to its neighbouring sibling branch
    Navigate {
        /// Session file (JSON)
        #[arg(long)]
        session: PathBuf,

        /// Node whose branch is switched
        #[arg(long)]
        node: String,

        /// Direction to move among siblings
        #[arg(long, value_enum, default_value = "next")]
        direction: DirectionArg,

        /// Save the updated session back to the file
        #[arg(long)]
        write: bool,
    },

    /// Check the tree for structural problems
    Validate {
        /// Session file (JSON)
        #[arg(long)]
        session: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Next,
    Prev,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Next => Direction::Next,
            DirectionArg::Prev => Direction::Prev,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Assemble {
            session,
            agent,
            global,
            user,
            logs,
        } => assemble(session, agent, global, user, logs, cli.json).await,
        Commands::Navigate {
            session,
            node,
            direction,
            write,
        } => navigate(session, &node, direction.into(), write, cli.json),
        Commands::Validate { session } => validate(session, cli.json),
    }
}

fn describe(content: &MessageContent) -> String {
    let mut text = content.text().into_owned();
    if let MessageContent::Parts(parts) = content {
        let media = parts.iter().filter(|p| !p.is_text()).count();
        if media > 0 {
            text.push_str(&format!(" [+{media} attachment(s)]"));
        }
        if let Some(ContentPart::Image { url, .. }) = parts.iter().find(|p| !p.is_text()) {
            text.push_str(&format!(" <{url}>"));
        }
    }
    text
}

async fn assemble(
    session_path: PathBuf,
    agent_path: PathBuf,
    global_path: Option<PathBuf>,
    user_path: Option<PathBuf>,
    show_logs: bool,
    json: bool,
) -> Result<()> {
    let session = files::load_session(&session_path)?;
    let agent = files::load_agent(&agent_path)?;
    let global = global_path.as_deref().map(files::load_global).transpose()?;
    let user = user_path.as_deref().map(files::load_user).transpose()?;

    let chars_per_token = global
        .as_ref()
        .map_or(4.0, |g| g.context.chars_per_token);
    let pipeline = ContextPipeline::standard(Arc::new(HeuristicTokenCalculator::with_ratio(
        chars_per_token,
    )));

    let mut ctx = PipelineContext::new(session, Arc::new(agent));
    if let Some(global) = global {
        ctx = ctx.with_global(Arc::new(global));
    }
    if let Some(user) = user {
        ctx = ctx.with_user(Arc::new(user));
    }

    info!(session_id = %ctx.session.id, agent_id = %ctx.agent.id, "Assembling context");
    pipeline.run(&mut ctx).await;

    if json {
        let output = serde_json::json!({
            "session_id": ctx.session.id,
            "model_id": ctx.model_id,
            "messages": ctx.messages,
            "limit": ctx.limit,
            "logs": ctx.logs,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Context for session {} ({} messages)", ctx.session.id, ctx.messages.len());
    println!("{}", "=".repeat(60));
    for (index, message) in ctx.messages.iter().enumerate() {
        println!("[{index}] {}: {}", message.role, describe(&message.content));
    }
    if let Some(limit) = &ctx.limit {
        println!("{}", "-".repeat(60));
        println!(
            "Tokens: presets {}, history kept {} of budget {} ({} kept, {} truncated)",
            limit.preset_tokens, limit.kept_tokens, limit.available_tokens, limit.kept, limit.truncated
        );
    }
    if show_logs {
        println!("{}", "-".repeat(60));
        for entry in &ctx.logs {
            let marker = match entry.level {
                LogLevel::Debug => "·",
                LogLevel::Info => "✓",
                LogLevel::Warn => "!",
                LogLevel::Error => "✗",
            };
            println!("{marker} [{}] {}", entry.processor_id, entry.message);
        }
    }
    Ok(())
}

fn navigate(
    session_path: PathBuf,
    node_id: &str,
    direction: Direction,
    write: bool,
    json: bool,
) -> Result<()> {
    let mut session = files::load_session(&session_path)?;
    if !session.contains(node_id) {
        bail!("Node {node_id} not found in {}", session_path.display());
    }

    let sibling = navigator::get_sibling_index(&session, node_id);
    let leaf = session
        .switch_branch(node_id, direction)
        .context("Failed to switch branch")?;
    let path: Vec<String> = session.active_path().iter().map(|n| n.id.clone()).collect();

    if write {
        files::save_session(&session_path, &session)?;
        info!(path = %session_path.display(), "Saved session");
    }

    if json {
        let output = serde_json::json!({
            "active_leaf_id": leaf,
            "active_path": path,
            "siblings": sibling.total,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if sibling.total <= 1 {
        println!("Node {node_id} has no siblings; active leaf unchanged");
    }
    println!("✓ Active leaf: {leaf}");
    for id in &path {
        if let Some(node) = session.node(id) {
            let index = navigator::get_sibling_index(&session, id);
            println!(
                "  {} ({}/{}) {}: {}",
                id,
                index.index + 1,
                index.total,
                node.role,
                describe(&node.content)
            );
        }
    }
    Ok(())
}

fn validate(session_path: PathBuf, json: bool) -> Result<()> {
    let session = files::load_session(&session_path)?;
    let issues = session.validate();

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else if issues.is_empty() {
        println!("✓ {} nodes, no problems found", session.len());
    } else {
        for issue in &issues {
            println!("✗ {issue}");
        }
    }

    if !issues.is_empty() {
        bail!("{} structural problem(s) in {}", issues.len(), session_path.display());
    }
    Ok(())
}
