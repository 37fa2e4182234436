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

//! Placement of preset messages relative to the history.

pub mod classifier;
pub mod depth;

pub use classifier::{
    apply_depth_injections, classify_preset_messages, expand_depth_specs, group_anchor_injections,
    AnchorBuckets, AnchorInjection, ClassifiedPresets, DepthInjection, DEFAULT_INJECTION_ORDER,
};
pub use depth::{DepthSpec, MAX_EXPANDED_DEPTHS};
