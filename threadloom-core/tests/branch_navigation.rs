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

//! Integration tests for branch navigation

use proptest::prelude::*;
use threadloom_core::{
    adjacent_sibling_id, find_leaf_of_branch, switch_to_sibling, update_selection_memory,
    ConversationSession, Direction, Role,
};

/// root -> q -> s0..sN, where sibling i carries a chain of `depths[i]` replies.
fn fan_out(depths: &[usize]) -> (ConversationSession, Vec<String>) {
    let mut session = ConversationSession::with_root_id("prop", "prop", "root");
    session.insert_child("root", "q", Role::User, "question").unwrap();

    let mut siblings = Vec::new();
    for (i, depth) in depths.iter().enumerate() {
        let sibling = session
            .insert_child("q", format!("s{i}"), Role::Assistant, format!("answer {i}"))
            .unwrap();
        let mut tip = sibling.clone();
        for d in 0..*depth {
            let role = if d % 2 == 0 { Role::User } else { Role::Assistant };
            tip = session
                .insert_child(&tip, format!("s{i}-{d}"), role, "reply")
                .unwrap();
        }
        siblings.push(sibling);
    }
    (session, siblings)
}

proptest! {
    #[test]
    fn prop_cycling_returns_to_start(
        depths in prop::collection::vec(0usize..4, 2..7),
        start in 0usize..7,
    ) {
        let (session, siblings) = fan_out(&depths);
        let start = start % siblings.len();
        let origin = siblings[start].clone();

        let mut current = origin.clone();
        let mut leaf = String::new();
        for _ in 0..siblings.len() {
            leaf = switch_to_sibling(&session, &current, Direction::Next);
            current = adjacent_sibling_id(&session, &current, Direction::Next).unwrap();
        }

        prop_assert_eq!(&current, &origin);
        prop_assert_eq!(leaf, find_leaf_of_branch(&session, &origin));
    }

    #[test]
    fn prop_next_then_prev_is_identity(
        depths in prop::collection::vec(0usize..3, 2..6),
        start in 0usize..6,
    ) {
        let (session, siblings) = fan_out(&depths);
        let origin = siblings[start % siblings.len()].clone();

        let next = adjacent_sibling_id(&session, &origin, Direction::Next).unwrap();
        let back = adjacent_sibling_id(&session, &next, Direction::Prev).unwrap();
        prop_assert_eq!(back, origin);
    }
}

#[test]
fn test_selection_memory_prefers_last_viewed_branch() {
    // A has children [B, C]; viewing C's branch must be remembered.
    let mut session = ConversationSession::with_root_id("s", "s", "A");
    session.insert_child("A", "B", Role::User, "b").unwrap();
    session.insert_child("B", "B1", Role::Assistant, "b1").unwrap();
    session.insert_child("A", "C", Role::User, "c").unwrap();
    session.insert_child("C", "C1", Role::Assistant, "c1").unwrap();

    assert_eq!(find_leaf_of_branch(&session, "A"), "B1");

    session.active_leaf_id = "C1".to_string();
    update_selection_memory(&mut session, "C1");

    assert_eq!(find_leaf_of_branch(&session, "A"), "C1");
}

#[test]
fn test_switching_away_and_back_restores_leaf() {
    let mut session = ConversationSession::with_root_id("s", "s", "root");
    session.insert_child("root", "q", Role::User, "q").unwrap();
    session.insert_child("q", "a", Role::Assistant, "a").unwrap();
    session.insert_child("a", "a-deep", Role::User, "deeper").unwrap();
    let b = session.create_branch("a", "b").unwrap();

    // Inside a's branch, create a second reply and view it.
    let alt = session.create_branch("a-deep", "deeper alt").unwrap();
    assert_eq!(session.active_leaf_id, alt);

    let on_b = session.switch_branch("a", Direction::Next).unwrap();
    assert_eq!(on_b, b);

    let back = session.switch_branch(&b, Direction::Prev).unwrap();
    assert_eq!(back, alt);
}

#[test]
fn test_navigation_on_corrupted_tree_never_panics() {
    let mut session = ConversationSession::with_root_id("s", "s", "root");
    session.insert_child("root", "q", Role::User, "q").unwrap();
    session.insert_child("q", "a", Role::Assistant, "a").unwrap();
    session.insert_child("q", "b", Role::Assistant, "b").unwrap();

    session.nodes.remove("b");
    session.node_mut("a").unwrap().parent_id = Some("q".to_string());
    session.node_mut("q").unwrap().last_selected_child_id = Some("b".to_string());

    assert_eq!(switch_to_sibling(&session, "a", Direction::Next), "a");
    // The remembered child is still listed but no longer resolves: stop at q.
    assert_eq!(find_leaf_of_branch(&session, "q"), "q");
    update_selection_memory(&mut session, "missing");
}
