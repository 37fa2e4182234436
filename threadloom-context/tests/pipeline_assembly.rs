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

//! End-to-end context assembly over a conversation tree.

use std::sync::Arc;
use threadloom_context::{
    stage, AgentConfig, AnchorPosition, ChatRegexConfig, ChatRegexRule, ContextLimitSettings,
    ContextPipeline, GlobalConfig, InjectionStrategy, LogLevel, MessageOrigin, PipelineContext,
    PresetMessage, RegexPreset, UserProfile, TRUNCATION_PLACEHOLDER,
};
use threadloom_core::{
    ConversationSession, Direction, HeuristicTokenCalculator, Role, TokenCalculator,
};

fn calculator() -> Arc<dyn TokenCalculator> {
    Arc::new(HeuristicTokenCalculator::new())
}

/// root -> u1 -> a1 -> u2, with an alternative a1' under u1.
fn conversation() -> ConversationSession {
    let mut session = ConversationSession::new("session-1", "Test");
    session.append_message(Role::User, "hello").unwrap();
    let a1 = session.append_message(Role::Assistant, "hi there").unwrap();
    session.append_message(Role::User, "tell me a story").unwrap();
    session.create_branch(&a1, "greetings").unwrap();
    session
}

fn texts(ctx: &PipelineContext) -> Vec<String> {
    ctx.messages.iter().map(|m| m.text().into_owned()).collect()
}

fn writer_agent() -> AgentConfig {
    AgentConfig::new("writer")
        .with_preset(PresetMessage::new("sys", Role::System, "You are a storyteller."))
        .with_preset(PresetMessage::anchor("profile", "user_profile"))
        .with_preset(PresetMessage::anchor("history", "chat_history"))
        .with_preset(PresetMessage::new("tail", Role::System, "Answer briefly."))
}

#[tokio::test]
async fn test_assembles_active_branch_in_skeleton_order() {
    let mut session = conversation();
    // Back to the original branch.
    let a1_prime = session.active_leaf_id.clone();
    session.switch_branch(&a1_prime, Direction::Prev).unwrap();

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(writer_agent()))
        .with_user(Arc::new(UserProfile::new("u", "The user likes dragons.")));
    pipeline.run(&mut ctx).await;

    assert_eq!(
        texts(&ctx),
        vec![
            "You are a storyteller.",
            "The user likes dragons.",
            "hello",
            "hi there",
            "tell me a story",
            "Answer briefly.",
        ]
    );
    assert_eq!(ctx.messages[1].origin, MessageOrigin::UserProfile);
    assert!(ctx.logs.iter().all(|e| e.level != LogLevel::Error));
}

#[tokio::test]
async fn test_history_appended_without_anchor_and_root_skipped() {
    let session = conversation();
    let agent = AgentConfig::new("bare")
        .with_preset(PresetMessage::new("sys", Role::System, "system prompt"));

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(agent));
    pipeline.run(&mut ctx).await;

    assert_eq!(texts(&ctx), vec!["system prompt", "hello", "greetings"]);
}

#[tokio::test]
async fn test_disabled_nodes_are_skipped() {
    let mut session = conversation();
    let first_user = session.active_path()[1].id.clone();
    session.node_mut(&first_user).unwrap().metadata.is_enabled = false;

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(AgentConfig::new("a")));
    pipeline.run(&mut ctx).await;

    assert_eq!(texts(&ctx), vec!["greetings"]);
}

#[tokio::test]
async fn test_depth_and_anchor_injections() {
    let mut session = ConversationSession::new("s", "Inject");
    for i in 0..4 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        session.append_message(role, format!("m{i}")).unwrap();
    }

    let agent = AgentConfig::new("inject")
        .with_preset(PresetMessage::anchor("history", "chat_history"))
        .with_preset(
            PresetMessage::new("note", Role::System, "note")
                .with_strategy(InjectionStrategy::at_depth(1)),
        )
        .with_preset(
            PresetMessage::new("intro", Role::System, "intro")
                .with_strategy(InjectionStrategy::at_anchor("chat_history", AnchorPosition::Before)),
        )
        .with_preset(
            PresetMessage::new("multi", Role::System, "every other")
                .with_strategy(InjectionStrategy::at_depths("2,4")),
        );

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(agent));
    pipeline.run(&mut ctx).await;

    assert_eq!(
        texts(&ctx),
        vec!["intro", "every other", "m0", "m1", "every other", "m2", "note", "m3"]
    );
}

#[tokio::test]
async fn test_presets_from_every_layer_are_injected() {
    let mut session = ConversationSession::new("s", "Layers");
    session.append_message(Role::User, "m0").unwrap();
    session.append_message(Role::Assistant, "m1").unwrap();

    let global = GlobalConfig::default().with_preset(
        PresetMessage::new("house-style", Role::System, "global note")
            .with_strategy(InjectionStrategy::at_depth(0)),
    );
    let agent = AgentConfig::new("layered")
        .with_preset(PresetMessage::anchor("history", "chat_history"))
        .with_preset(
            PresetMessage::new("agent-intro", Role::System, "agent intro")
                .with_strategy(InjectionStrategy::at_anchor("chat_history", AnchorPosition::Before)),
        );
    let user = UserProfile::new("u", "").with_preset(
        PresetMessage::new("persona-intro", Role::System, "persona intro")
            .with_strategy(InjectionStrategy::at_anchor("chat_history", AnchorPosition::Before)),
    );

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(agent))
        .with_global(Arc::new(global))
        .with_user(Arc::new(user));
    pipeline.run(&mut ctx).await;

    assert_eq!(
        texts(&ctx),
        vec!["agent intro", "persona intro", "m0", "m1", "global note"]
    );
    assert_eq!(
        ctx.messages[1].origin,
        MessageOrigin::Injection {
            preset_id: "persona-intro".to_string()
        }
    );
}

#[tokio::test]
async fn test_regex_layers_apply_to_history_only() {
    let mut session = ConversationSession::new("s", "Regex");
    session.append_message(Role::User, "I love cats").unwrap();
    session.append_message(Role::Assistant, "cats are great").unwrap();

    let global = GlobalConfig {
        regex: Some(ChatRegexConfig::new(vec![RegexPreset::new(
            "global",
            vec![ChatRegexRule::new("cats", "cats", "dogs")],
        )
        .with_priority(10)])),
        ..Default::default()
    };
    let agent = AgentConfig::new("regex")
        .with_preset(PresetMessage::new("sys", Role::System, "cats only"))
        .with_regex(ChatRegexConfig::new(vec![RegexPreset::new(
            "agent",
            vec![ChatRegexRule::new("dogs", "dogs", "wolves").with_roles(vec![Role::Assistant])],
        )
        .with_priority(20)]));

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(agent)).with_global(Arc::new(global));
    pipeline.run(&mut ctx).await;

    assert_eq!(texts(&ctx), vec!["cats only", "I love dogs", "wolves are great"]);
}

#[tokio::test]
async fn test_context_limit_truncates_oldest_and_records_tokens() {
    let mut session = ConversationSession::new("s", "Limit");
    for text in ["aaaaaaaa", "bbbbbbbb", "cccccccc", "dddddddd"] {
        session.append_message(Role::User, text).unwrap();
    }
    // 8 ASCII chars are 2 tokens each; 5 tokens keep the newest two.
    let agent = AgentConfig::new("limit").with_context_limit(ContextLimitSettings::new(5, 0));

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(agent));
    pipeline.run(&mut ctx).await;

    assert_eq!(
        texts(&ctx),
        vec![TRUNCATION_PLACEHOLDER, TRUNCATION_PLACEHOLDER, "cccccccc", "dddddddd"]
    );

    let leaf = ctx.session.active_leaf().unwrap();
    assert_eq!(leaf.metadata.token_count, Some(2));
    assert_eq!(leaf.metadata.token_estimated, Some(true));

    let limit = ctx.limit.as_ref().unwrap();
    assert_eq!(limit.kept, 2);
    assert_eq!(limit.truncated, 2);
}

#[tokio::test]
async fn test_presets_exhausting_budget_drop_history() {
    let mut session = ConversationSession::new("s", "Exhaust");
    session.append_message(Role::User, "question").unwrap();
    let agent = AgentConfig::new("big")
        .with_preset(PresetMessage::new("sys", Role::System, "x".repeat(400)))
        .with_context_limit(ContextLimitSettings::new(50, 0));

    let pipeline = ContextPipeline::standard(calculator());
    let mut ctx = PipelineContext::new(session, Arc::new(agent));
    pipeline.run(&mut ctx).await;

    assert_eq!(ctx.messages.len(), 1);
    assert!(ctx
        .logs_for(stage::CONTEXT_LIMITER)
        .any(|e| e.level == LogLevel::Warn));
}

#[tokio::test]
async fn test_pipeline_rereads_tree_each_run() {
    let pipeline = ContextPipeline::standard(calculator());
    let agent = Arc::new(AgentConfig::new("a"));

    let mut session = ConversationSession::new("s", "Reread");
    session.append_message(Role::User, "first").unwrap();
    let mut ctx = PipelineContext::new(session, agent.clone());
    pipeline.run(&mut ctx).await;
    assert_eq!(texts(&ctx), vec!["first"]);

    let mut session = ctx.session;
    session.append_message(Role::Assistant, "second").unwrap();
    let mut ctx = PipelineContext::new(session, agent);
    pipeline.run(&mut ctx).await;
    assert_eq!(texts(&ctx), vec!["first", "second"]);
}
